// src/crosslink.rs
//
// Static association between volunteer event types and challenge
// categories, and the in-memory joins built on it. All lookups here are
// pure functions over full collections; at tens-to-hundreds of documents
// the O(events × challenges) scans are fine and deliberately unindexed.

use chrono::{DateTime, Utc};

use crate::challenges::{challenge_status, ChallengeStatus};
use crate::models::{Challenge, VolunteerEvent};

/// Hand-authored mapping: which challenge categories an event type can
/// award progress toward.
pub const EVENT_CHALLENGE_MAP: &[(&str, &[&str])] = &[
    ("cleanup", &["recycling", "plastic-reduction", "waste-reduction"]),
    ("tree-planting", &["carbon-offset", "green-spaces"]),
    ("workshop", &["education", "sustainable-living"]),
    ("community-service", &["community-action", "waste-reduction"]),
];

pub fn categories_for(event_type: &str) -> &'static [&'static str] {
    EVENT_CHALLENGE_MAP
        .iter()
        .find(|(t, _)| *t == event_type)
        .map(|(_, cats)| *cats)
        .unwrap_or(&[])
}

pub fn awards_category(event_type: &str, category: &str) -> bool {
    categories_for(event_type).contains(&category)
}

/// Challenges an event of the given type can award progress toward,
/// restricted to currently active ones.
pub fn related_challenges<'a>(
    event_type: &str,
    challenges: &'a [Challenge],
    now: DateTime<Utc>,
) -> Vec<&'a Challenge> {
    challenges
        .iter()
        .filter(|c| awards_category(event_type, &c.category))
        .filter(|c| challenge_status(now, c.start_date, c.end_date) == ChallengeStatus::Active)
        .collect()
}

/// Events relevant to a challenge of the given category (inverse lookup,
/// no activity filter: past events stay listed on the challenge page).
pub fn related_events<'a>(
    category: &str,
    events: &'a [VolunteerEvent],
) -> Vec<&'a VolunteerEvent> {
    events
        .iter()
        .filter(|e| awards_category(&e.event_type, category))
        .collect()
}

/// Challenges that joining the given event rewards for this user:
/// related, active, and the user already participates.
pub fn eligible_challenges<'a>(
    event_type: &str,
    user_id: &str,
    challenges: &'a [Challenge],
    now: DateTime<Utc>,
) -> Vec<&'a Challenge> {
    related_challenges(event_type, challenges, now)
        .into_iter()
        .filter(|c| c.participants.iter().any(|p| p == user_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge(id: &str, category: &str, participants: &[&str]) -> Challenge {
        let now = Utc::now();
        Challenge {
            challenge_id: id.to_string(),
            title: format!("challenge {}", id),
            description: String::new(),
            category: category.to_string(),
            start_date: Some(now - Duration::days(10)),
            end_date: Some(now + Duration::days(10)),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            target_actions: 5,
            badge: "badge".to_string(),
            created_by: "coordinator".to_string(),
            created_at: now,
        }
    }

    fn event(id: &str, event_type: &str) -> VolunteerEvent {
        VolunteerEvent {
            event_id: id.to_string(),
            title: format!("event {}", id),
            description: String::new(),
            event_type: event_type.to_string(),
            date: Utc::now(),
            location: "riverbank".to_string(),
            max_volunteers: 20,
            volunteers: vec![],
            duration_hours: 2.0,
            created_by: "coordinator".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cleanup_awards_recycling_but_not_education() {
        assert!(awards_category("cleanup", "recycling"));
        assert!(awards_category("cleanup", "plastic-reduction"));
        assert!(!awards_category("cleanup", "education"));
        assert!(!awards_category("unknown-type", "recycling"));
    }

    #[test]
    fn reward_count_matches_participation_exactly() {
        // cleanup maps onto recycling and plastic-reduction; the user is
        // in one matching and one non-matching challenge, so exactly one
        // challenge is eligible for the award.
        let challenges = vec![
            challenge("c1", "recycling", &["ada"]),
            challenge("c2", "education", &["ada"]),
            challenge("c3", "plastic-reduction", &["someone-else"]),
        ];
        let eligible = eligible_challenges("cleanup", "ada", &challenges, Utc::now());
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].challenge_id, "c1");
    }

    #[test]
    fn inactive_challenges_are_not_rewarded() {
        let mut expired = challenge("c1", "recycling", &["ada"]);
        expired.end_date = Some(Utc::now() - Duration::days(1));
        let challenges = vec![expired];
        assert!(eligible_challenges("cleanup", "ada", &challenges, Utc::now()).is_empty());
    }

    #[test]
    fn related_events_is_the_inverse_lookup() {
        let events = vec![
            event("e1", "cleanup"),
            event("e2", "workshop"),
            event("e3", "community-service"),
        ];
        let related: Vec<&str> = related_events("waste-reduction", &events)
            .iter()
            .map(|e| e.event_id.as_str())
            .collect();
        assert_eq!(related, vec!["e1", "e3"]);
    }
}

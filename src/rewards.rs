// src/rewards.rs
//
// Append-only action ledger. Every point-awarding activity is one
// ActionRecord whose _id is deterministic, so applying the same award
// twice collides on the unique key and becomes a no-op. Aggregates
// (totals, hours, badges) are folded from the ledger on read; there are
// no stored counters to drift when a multi-step write fails partway.

use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::Collection;
use uuid::Uuid;
use log::error;

use crate::app_state::AppState;
use crate::models::{ActionRecord, Challenge, UserStats, VolunteerEvent, VolunteerProfile};

/// Fixed award for event participation that advances a challenge.
pub const CHALLENGE_AWARD_POINTS: i32 = 50;
/// Award for confirmed attendance at a volunteer event.
pub const ATTENDANCE_POINTS: i32 = 25;

/// Deterministic ledger id: UUIDv5 over the fields that identify the
/// award. Same (kind, user, event, challenge) always hashes to the same
/// id, which is what makes `apply_action` idempotent.
pub fn action_id(
    kind: &str,
    user_id: &str,
    event_id: Option<&str>,
    challenge_id: Option<&str>,
) -> String {
    let name = format!(
        "{}:{}:{}:{}",
        kind,
        user_id,
        event_id.unwrap_or("-"),
        challenge_id.unwrap_or("-"),
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

pub fn event_join_record(user_id: &str, event_id: &str) -> ActionRecord {
    ActionRecord {
        action_id: action_id("event_join", user_id, Some(event_id), None),
        user_id: user_id.to_string(),
        kind: "event_join".to_string(),
        points: 0,
        challenge_id: None,
        event_id: Some(event_id.to_string()),
        recorded_at: Utc::now(),
    }
}

pub fn attendance_record(user_id: &str, event_id: &str) -> ActionRecord {
    ActionRecord {
        action_id: action_id("event_attended", user_id, Some(event_id), None),
        user_id: user_id.to_string(),
        kind: "event_attended".to_string(),
        points: ATTENDANCE_POINTS,
        challenge_id: None,
        event_id: Some(event_id.to_string()),
        recorded_at: Utc::now(),
    }
}

pub fn challenge_progress_record(user_id: &str, event_id: &str, challenge_id: &str) -> ActionRecord {
    ActionRecord {
        action_id: action_id("challenge_progress", user_id, Some(event_id), Some(challenge_id)),
        user_id: user_id.to_string(),
        kind: "challenge_progress".to_string(),
        points: CHALLENGE_AWARD_POINTS,
        challenge_id: Some(challenge_id.to_string()),
        event_id: Some(event_id.to_string()),
        recorded_at: Utc::now(),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(*err.kind, ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == 11000)
}

/// Appends one ledger entry. Returns false when the entry already exists
/// (duplicate key on the deterministic _id), which callers treat as
/// success: the award was granted by an earlier, possibly partial, run.
pub async fn apply_action(
    actions: &Collection<ActionRecord>,
    record: &ActionRecord,
) -> Result<bool, mongodb::error::Error> {
    match actions.insert_one(record).await {
        Ok(_) => Ok(true),
        Err(e) if is_duplicate_key(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Folds the ledger (plus attended events and the user's challenges)
/// into the aggregate view. `total_actions` counts activities, not
/// awards: one event join is one action no matter how many challenges
/// it rewarded.
pub fn fold_stats(
    user_id: &str,
    actions: &[ActionRecord],
    attended_events: &[VolunteerEvent],
    challenges: &[Challenge],
) -> UserStats {
    let total_actions = actions
        .iter()
        .filter(|a| a.kind != "challenge_progress")
        .count() as i64;
    let total_points: i64 = actions.iter().map(|a| a.points as i64).sum();
    let total_hours: f64 = attended_events.iter().map(|e| e.duration_hours).sum();

    let mut badges = Vec::new();
    for challenge in challenges {
        if !challenge.participants.iter().any(|p| p == user_id) {
            continue;
        }
        let progress = actions
            .iter()
            .filter(|a| {
                a.kind == "challenge_progress"
                    && a.challenge_id.as_deref() == Some(challenge.challenge_id.as_str())
            })
            .count() as i32;
        if progress >= challenge.target_actions {
            badges.push(challenge.badge.clone());
        }
    }

    UserStats {
        user_id: user_id.to_string(),
        total_actions,
        total_points,
        total_hours,
        events_attended: attended_events.len() as i64,
        badges,
    }
}

// GET /stats/{user_id}
// Recomputes the user's aggregates from the ledger and profile.
pub async fn get_user_stats(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let user_id = user_id.into_inner();
    let actions_coll = data.mongodb.db.collection::<ActionRecord>("actions");

    let mut cursor = match actions_coll.find(doc! { "user_id": &user_id }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching actions: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching actions");
        }
    };
    let mut actions = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(action) => actions.push(action),
            Err(e) => {
                error!("Error iterating actions: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating actions");
            }
        }
    }

    // Attended events come from the profile; missing profile means none.
    let profiles = data.mongodb.db.collection::<VolunteerProfile>("volunteerProfiles");
    let attended_ids = match profiles.find_one(doc! { "user_id": &user_id }).await {
        Ok(Some(profile)) => profile.attended_events,
        Ok(None) => vec![],
        Err(e) => {
            error!("Error fetching volunteer profile: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching volunteer profile");
        }
    };

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let mut attended_events = Vec::new();
    if !attended_ids.is_empty() {
        let filter = doc! { "_id": { "$in": attended_ids.clone() } };
        let mut cursor = match events_coll.find(filter).await {
            Ok(cursor) => cursor,
            Err(e) => {
                error!("Error fetching attended events: {}", e);
                return HttpResponse::InternalServerError().body("Error fetching attended events");
            }
        };
        while let Some(res) = cursor.next().await {
            if let Ok(event) = res {
                attended_events.push(event);
            }
        }
    }

    let challenges_coll = data.mongodb.db.collection::<Challenge>("challenges");
    let mut challenges = Vec::new();
    let mut cursor = match challenges_coll.find(doc! { "participants": &user_id }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching challenges: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenges");
        }
    };
    while let Some(res) = cursor.next().await {
        if let Ok(challenge) = res {
            challenges.push(challenge);
        }
    }

    let stats = fold_stats(&user_id, &actions, &attended_events, &challenges);
    HttpResponse::Ok().json(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn challenge_with_target(id: &str, target: i32, participants: &[&str]) -> Challenge {
        let now = Utc::now();
        Challenge {
            challenge_id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            category: "recycling".to_string(),
            start_date: Some(now - Duration::days(5)),
            end_date: Some(now + Duration::days(5)),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            target_actions: target,
            badge: format!("{}-badge", id),
            created_by: "coordinator".to_string(),
            created_at: now,
        }
    }

    fn attended(id: &str, hours: f64) -> VolunteerEvent {
        VolunteerEvent {
            event_id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            event_type: "cleanup".to_string(),
            date: Utc::now(),
            location: "park".to_string(),
            max_volunteers: 10,
            volunteers: vec!["ada".to_string()],
            duration_hours: hours,
            created_by: "coordinator".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn action_ids_are_deterministic() {
        let a = action_id("challenge_progress", "ada", Some("e1"), Some("c1"));
        let b = action_id("challenge_progress", "ada", Some("e1"), Some("c1"));
        assert_eq!(a, b);
        // Any differing field produces a different id.
        assert_ne!(a, action_id("challenge_progress", "ada", Some("e2"), Some("c1")));
        assert_ne!(a, action_id("challenge_progress", "bob", Some("e1"), Some("c1")));
        assert_ne!(a, action_id("event_join", "ada", Some("e1"), Some("c1")));
    }

    #[test]
    fn one_join_is_one_action_regardless_of_awards() {
        let actions = vec![
            event_join_record("ada", "e1"),
            challenge_progress_record("ada", "e1", "c1"),
            challenge_progress_record("ada", "e1", "c2"),
        ];
        let stats = fold_stats("ada", &actions, &[], &[]);
        assert_eq!(stats.total_actions, 1);
        assert_eq!(stats.total_points, (2 * CHALLENGE_AWARD_POINTS) as i64);
    }

    #[test]
    fn hours_and_attendance_fold_from_events() {
        let actions = vec![
            attendance_record("ada", "e1"),
            attendance_record("ada", "e2"),
        ];
        let events = vec![attended("e1", 2.5), attended("e2", 3.0)];
        let stats = fold_stats("ada", &actions, &events, &[]);
        assert_eq!(stats.events_attended, 2);
        assert!((stats.total_hours - 5.5).abs() < f64::EPSILON);
        assert_eq!(stats.total_points, (2 * ATTENDANCE_POINTS) as i64);
    }

    #[test]
    fn badge_awarded_when_progress_reaches_target() {
        let challenge = challenge_with_target("c1", 2, &["ada"]);
        let below = vec![challenge_progress_record("ada", "e1", "c1")];
        assert!(fold_stats("ada", &below, &[], std::slice::from_ref(&challenge))
            .badges
            .is_empty());

        let at_target = vec![
            challenge_progress_record("ada", "e1", "c1"),
            challenge_progress_record("ada", "e2", "c1"),
        ];
        let stats = fold_stats("ada", &at_target, &[], &[challenge]);
        assert_eq!(stats.badges, vec!["c1-badge".to_string()]);
    }

    #[test]
    fn badge_requires_participation() {
        let challenge = challenge_with_target("c1", 1, &["someone-else"]);
        let actions = vec![challenge_progress_record("ada", "e1", "c1")];
        assert!(fold_stats("ada", &actions, &[], &[challenge]).badges.is_empty());
    }
}

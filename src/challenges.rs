// src/challenges.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;
use crate::crosslink::related_events;
use crate::models::{Challenge, VolunteerEvent};

/// Derived lifecycle position of a challenge. Never stored; every call
/// site derives it through `challenge_status` so the boundary semantics
/// cannot drift between views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Upcoming,
    Active,
    Completed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Upcoming => "upcoming",
            ChallengeStatus::Active => "active",
            ChallengeStatus::Completed => "completed",
        }
    }
}

/// Window boundaries are inclusive on both ends: a challenge is active
/// at exactly `start_date` and at exactly `end_date`. A missing start
/// means already started, a missing end means no deadline.
pub fn challenge_status(
    now: DateTime<Utc>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> ChallengeStatus {
    if let Some(start) = start_date {
        if now < start {
            return ChallengeStatus::Upcoming;
        }
    }
    if let Some(end) = end_date {
        if now > end {
            return ChallengeStatus::Completed;
        }
    }
    ChallengeStatus::Active
}

/// What the frontend sees: the stored document plus the derived status.
#[derive(Debug, Serialize)]
pub struct ChallengeView {
    pub challenge_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub participants: Vec<String>,
    pub target_actions: i32,
    pub badge: String,
    pub status: &'static str,
}

impl ChallengeView {
    fn from_challenge(c: Challenge, now: DateTime<Utc>) -> Self {
        let status = challenge_status(now, c.start_date, c.end_date).as_str();
        Self {
            challenge_id: c.challenge_id,
            title: c.title,
            description: c.description,
            category: c.category,
            start_date: c.start_date,
            end_date: c.end_date,
            participants: c.participants,
            target_actions: c.target_actions,
            badge: c.badge,
            status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChallengeRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub target_actions: i32,
    pub badge: String,
}

// POST /challenges
// Coordinator-only: creates a new challenge with an empty participant set.
pub async fn create_challenge(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateChallengeRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let users = data.mongodb.db.collection::<mongodb::bson::Document>("users");
    let coordinator_filter = doc! { "user_id": &current_user, "role": "coordinator" };
    if users.find_one(coordinator_filter).await.ok().flatten().is_none() {
        return HttpResponse::Unauthorized().body("Only coordinators can create challenges");
    }

    if payload.target_actions <= 0 {
        return HttpResponse::BadRequest().body("target_actions must be positive");
    }

    let new_challenge = Challenge {
        challenge_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        category: payload.category.clone(),
        start_date: payload.start_date,
        end_date: payload.end_date,
        participants: vec![],
        target_actions: payload.target_actions,
        badge: payload.badge.clone(),
        created_by: current_user,
        created_at: Utc::now(),
    };

    let challenges = data.mongodb.db.collection::<Challenge>("challenges");
    match challenges.insert_one(&new_challenge).await {
        Ok(_) => {
            info!("Challenge created: {}", new_challenge.challenge_id);
            HttpResponse::Ok().json(&new_challenge)
        }
        Err(e) => {
            error!("Error creating challenge: {}", e);
            HttpResponse::InternalServerError().body("Error creating challenge")
        }
    }
}

// GET /challenges
// Lists every challenge with its derived status.
pub async fn list_challenges(data: web::Data<AppState>) -> impl Responder {
    let challenges = data.mongodb.db.collection::<Challenge>("challenges");
    let mut cursor = match challenges.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching challenges: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenges");
        }
    };

    let now = Utc::now();
    let mut views = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(challenge) => views.push(ChallengeView::from_challenge(challenge, now)),
            Err(e) => {
                error!("Error iterating challenges: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating challenges");
            }
        }
    }
    HttpResponse::Ok().json(views)
}

// POST /challenges/{challenge_id}/join
// Adds the authenticated user to the participant set. Participation is
// append-only; there is no leave operation.
pub async fn join_challenge(
    req: HttpRequest,
    data: web::Data<AppState>,
    challenge_id: web::Path<String>,
) -> impl Responder {
    let challenge_id = challenge_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let challenges = data.mongodb.db.collection::<Challenge>("challenges");
    let challenge = match challenges.find_one(doc! { "_id": &challenge_id }).await {
        Ok(Some(c)) => c,
        Ok(None) => return HttpResponse::NotFound().body("Challenge not found"),
        Err(e) => {
            error!("Error fetching challenge: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenge");
        }
    };

    let status = challenge_status(Utc::now(), challenge.start_date, challenge.end_date);
    if status != ChallengeStatus::Active {
        return HttpResponse::BadRequest()
            .body(format!("Challenge is {}, not active", status.as_str()));
    }

    // $addToSet keeps the join idempotent at the store level.
    let update = doc! { "$addToSet": { "participants": &current_user } };
    match challenges.update_one(doc! { "_id": &challenge_id }, update).await {
        Ok(_) => {
            info!("User {} joined challenge {}", current_user, challenge_id);
            HttpResponse::Ok().json(serde_json::json!({ "joined": true }))
        }
        Err(e) => {
            error!("Error joining challenge: {}", e);
            HttpResponse::InternalServerError().body("Error joining challenge")
        }
    }
}

// GET /challenges/{challenge_id}/related_events
// Volunteer events whose type maps onto this challenge's category.
pub async fn get_related_events(
    data: web::Data<AppState>,
    challenge_id: web::Path<String>,
) -> impl Responder {
    let challenges = data.mongodb.db.collection::<Challenge>("challenges");
    let challenge = match challenges.find_one(doc! { "_id": &*challenge_id }).await {
        Ok(Some(c)) => c,
        Ok(None) => return HttpResponse::NotFound().body("Challenge not found"),
        Err(e) => {
            error!("Error fetching challenge: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenge");
        }
    };

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let mut cursor = match events_coll.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching events: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching events");
        }
    };

    let mut events = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(event) => events.push(event),
            Err(e) => {
                error!("Error iterating events: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating events");
            }
        }
    }

    let related: Vec<&VolunteerEvent> = related_events(&challenge.category, &events);
    HttpResponse::Ok().json(related)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_straddling_now_is_active() {
        let now = Utc::now();
        let status = challenge_status(
            now,
            Some(now - Duration::days(10)),
            Some(now + Duration::days(10)),
        );
        assert_eq!(status, ChallengeStatus::Active);
    }

    #[test]
    fn past_window_is_completed() {
        let now = Utc::now();
        let status = challenge_status(
            now,
            Some(now - Duration::days(30)),
            Some(now - Duration::days(1)),
        );
        assert_eq!(status, ChallengeStatus::Completed);
    }

    #[test]
    fn future_window_is_upcoming() {
        let now = Utc::now();
        let status = challenge_status(now, Some(now + Duration::days(1)), None);
        assert_eq!(status, ChallengeStatus::Upcoming);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let now = Utc::now();
        // Exactly at the start instant and exactly at the end instant the
        // challenge counts as active.
        assert_eq!(
            challenge_status(now, Some(now), Some(now + Duration::days(1))),
            ChallengeStatus::Active
        );
        assert_eq!(
            challenge_status(now, Some(now - Duration::days(1)), Some(now)),
            ChallengeStatus::Active
        );
    }

    #[test]
    fn open_ended_windows() {
        let now = Utc::now();
        assert_eq!(challenge_status(now, None, None), ChallengeStatus::Active);
        assert_eq!(
            challenge_status(now, None, Some(now - Duration::seconds(1))),
            ChallengeStatus::Completed
        );
        assert_eq!(
            challenge_status(now, Some(now - Duration::seconds(1)), None),
            ChallengeStatus::Active
        );
    }
}

// src/events.rs
//
// Volunteer events and the reward attribution that runs when a user
// joins one. The join sequence is a chain of independent writes with no
// cross-document transaction; every step is idempotent (set-union or
// keyed ledger insert), so re-running the handler after a partial
// failure completes the remainder without double-granting anything.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;
use log::{error, info, warn};

use crate::app_state::AppState;
use crate::crosslink::{eligible_challenges, related_challenges};
use crate::models::{ActionRecord, Challenge, VolunteerEvent, VolunteerProfile};
use crate::rewards;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub max_volunteers: i32,
    pub duration_hours: f64,
}

const EVENT_TYPES: &[&str] = &["cleanup", "tree-planting", "workshop", "community-service"];

/// Capacity gate for joining. Re-joining is always allowed: the store's
/// set-union makes it a no-op, so the handler stays idempotent.
pub fn check_join(event: &VolunteerEvent, user_id: &str) -> Result<(), &'static str> {
    if event.volunteers.iter().any(|v| v == user_id) {
        return Ok(());
    }
    if event.volunteers.len() as i32 >= event.max_volunteers {
        return Err("Event is full");
    }
    Ok(())
}

// POST /events
// Coordinator-only.
pub async fn create_event(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateEventRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let users = data.mongodb.db.collection::<mongodb::bson::Document>("users");
    let coordinator_filter = doc! { "user_id": &current_user, "role": "coordinator" };
    if users.find_one(coordinator_filter).await.ok().flatten().is_none() {
        return HttpResponse::Unauthorized().body("Only coordinators can create events");
    }

    if !EVENT_TYPES.contains(&payload.event_type.as_str()) {
        return HttpResponse::BadRequest().body("Unknown event type");
    }
    if payload.max_volunteers <= 0 {
        return HttpResponse::BadRequest().body("max_volunteers must be positive");
    }

    let new_event = VolunteerEvent {
        event_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        event_type: payload.event_type.clone(),
        date: payload.date,
        location: payload.location.clone(),
        max_volunteers: payload.max_volunteers,
        volunteers: vec![],
        duration_hours: payload.duration_hours,
        created_by: current_user,
        created_at: Utc::now(),
    };

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    match events_coll.insert_one(&new_event).await {
        Ok(_) => {
            info!("Event created: {}", new_event.event_id);
            HttpResponse::Ok().json(&new_event)
        }
        Err(e) => {
            error!("Error creating event: {}", e);
            HttpResponse::InternalServerError().body("Error creating event")
        }
    }
}

// GET /events
pub async fn list_events(data: web::Data<AppState>) -> impl Responder {
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
    HttpResponse::Ok().json(events)
}

async fn fetch_all_challenges(
    data: &AppState,
) -> Result<Vec<Challenge>, mongodb::error::Error> {
    let challenges_coll = data.mongodb.db.collection::<Challenge>("challenges");
    let mut cursor = challenges_coll.find(doc! {}).await?;
    let mut challenges = Vec::new();
    while let Some(res) = cursor.next().await {
        challenges.push(res?);
    }
    Ok(challenges)
}

// POST /events/{event_id}/join
//
// 1. capacity check + add to the volunteer set
// 2. upsert the volunteer profile
// 3. find the user's active challenges this event type maps onto
// 4. append one 50-point ledger entry per matching challenge
// 5. append the single join entry (one join = one action, however many
//    challenges it rewarded)
pub async fn join_event(
    req: HttpRequest,
    data: web::Data<AppState>,
    event_id: web::Path<String>,
) -> impl Responder {
    let event_id = event_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let event = match events_coll.find_one(doc! { "_id": &event_id }).await {
        Ok(Some(event)) => event,
        Ok(None) => return HttpResponse::NotFound().body("Event not found"),
        Err(e) => {
            error!("Error fetching event: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching event");
        }
    };

    if let Err(reason) = check_join(&event, &current_user) {
        return HttpResponse::BadRequest().body(reason);
    }

    let update = doc! { "$addToSet": { "volunteers": &current_user } };
    if let Err(e) = events_coll.update_one(doc! { "_id": &event_id }, update).await {
        error!("Error joining event: {}", e);
        return HttpResponse::InternalServerError().body("Error joining event");
    }

    let now = Utc::now();
    let profiles = data.mongodb.db.collection::<VolunteerProfile>("volunteerProfiles");
    let profile_update = doc! {
        "$addToSet": { "upcoming_events": &event_id },
        "$set": { "updated_at": now.to_rfc3339() },
        "$setOnInsert": {
            "attended_events": [],
            "created_at": now.to_rfc3339(),
        },
    };
    if let Err(e) = profiles
        .update_one(doc! { "user_id": &current_user }, profile_update)
        .upsert(true)
        .await
    {
        error!("Error upserting volunteer profile: {}", e);
        return HttpResponse::InternalServerError().body("Error updating volunteer profile");
    }

    let challenges = match fetch_all_challenges(&data).await {
        Ok(challenges) => challenges,
        Err(e) => {
            error!("Error fetching challenges: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenges");
        }
    };
    let eligible = eligible_challenges(&event.event_type, &current_user, &challenges, now);

    let actions_coll = data.mongodb.db.collection::<ActionRecord>("actions");
    let mut rewarded = 0;
    for challenge in &eligible {
        let record =
            rewards::challenge_progress_record(&current_user, &event_id, &challenge.challenge_id);
        match rewards::apply_action(&actions_coll, &record).await {
            Ok(true) => rewarded += 1,
            Ok(false) => {
                // Granted by an earlier (possibly partial) run.
                warn!(
                    "Challenge award already applied: user {} challenge {}",
                    current_user, challenge.challenge_id
                );
            }
            Err(e) => {
                error!("Error writing challenge award: {}", e);
                return HttpResponse::InternalServerError().body("Error writing challenge award");
            }
        }
    }

    let join_record = rewards::event_join_record(&current_user, &event_id);
    if let Err(e) = rewards::apply_action(&actions_coll, &join_record).await {
        error!("Error writing join action: {}", e);
        return HttpResponse::InternalServerError().body("Error writing join action");
    }

    info!(
        "User {} joined event {} ({} challenge awards)",
        current_user, event_id, rewarded
    );
    HttpResponse::Ok().json(serde_json::json!({
        "joined": true,
        "challenges_rewarded": eligible.len(),
    }))
}

// POST /events/{event_id}/leave
// Symmetric removal from the volunteer set. Awards already granted stay
// on the ledger; there is no clawback.
pub async fn leave_event(
    req: HttpRequest,
    data: web::Data<AppState>,
    event_id: web::Path<String>,
) -> impl Responder {
    let event_id = event_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let update = doc! { "$pull": { "volunteers": &current_user } };
    match events_coll.update_one(doc! { "_id": &event_id }, update).await {
        Ok(res) if res.matched_count == 0 => return HttpResponse::NotFound().body("Event not found"),
        Ok(_) => {}
        Err(e) => {
            error!("Error leaving event: {}", e);
            return HttpResponse::InternalServerError().body("Error leaving event");
        }
    }

    let profiles = data.mongodb.db.collection::<VolunteerProfile>("volunteerProfiles");
    let profile_update = doc! {
        "$pull": { "upcoming_events": &event_id },
        "$set": { "updated_at": Utc::now().to_rfc3339() },
    };
    if let Err(e) = profiles
        .update_one(doc! { "user_id": &current_user }, profile_update)
        .await
    {
        error!("Error updating volunteer profile: {}", e);
        return HttpResponse::InternalServerError().body("Error updating volunteer profile");
    }

    HttpResponse::Ok().json(serde_json::json!({ "joined": false }))
}

// POST /events/{event_id}/attendance
// Coordinator confirms the event happened: every volunteer's profile
// moves the event from upcoming to attended, and each gets an attendance
// ledger entry. Idempotent for the same reasons join is.
pub async fn record_attendance(
    req: HttpRequest,
    data: web::Data<AppState>,
    event_id: web::Path<String>,
) -> impl Responder {
    let event_id = event_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let users = data.mongodb.db.collection::<mongodb::bson::Document>("users");
    let coordinator_filter = doc! { "user_id": &current_user, "role": "coordinator" };
    if users.find_one(coordinator_filter).await.ok().flatten().is_none() {
        return HttpResponse::Unauthorized().body("Only coordinators can record attendance");
    }

    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let event = match events_coll.find_one(doc! { "_id": &event_id }).await {
        Ok(Some(event)) => event,
        Ok(None) => return HttpResponse::NotFound().body("Event not found"),
        Err(e) => {
            error!("Error fetching event: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching event");
        }
    };

    let profiles = data.mongodb.db.collection::<VolunteerProfile>("volunteerProfiles");
    let actions_coll = data.mongodb.db.collection::<ActionRecord>("actions");
    let now = Utc::now();

    for volunteer in &event.volunteers {
        let profile_update = doc! {
            "$pull": { "upcoming_events": &event_id },
            "$addToSet": { "attended_events": &event_id },
            "$set": { "updated_at": now.to_rfc3339() },
        };
        if let Err(e) = profiles
            .update_one(doc! { "user_id": volunteer }, profile_update)
            .await
        {
            error!("Error updating profile for {}: {}", volunteer, e);
            return HttpResponse::InternalServerError().body("Error updating volunteer profiles");
        }

        let record = rewards::attendance_record(volunteer, &event_id);
        if let Err(e) = rewards::apply_action(&actions_coll, &record).await {
            error!("Error writing attendance action for {}: {}", volunteer, e);
            return HttpResponse::InternalServerError().body("Error writing attendance actions");
        }
    }

    info!(
        "Attendance recorded for event {} ({} volunteers)",
        event_id,
        event.volunteers.len()
    );
    HttpResponse::Ok().json(serde_json::json!({ "attendees": event.volunteers.len() }))
}

// GET /events/{event_id}/related_challenges
// Active challenges this event's type can award progress toward.
pub async fn get_related_challenges(
    data: web::Data<AppState>,
    event_id: web::Path<String>,
) -> impl Responder {
    let events_coll = data.mongodb.db.collection::<VolunteerEvent>("volunteerEvents");
    let event = match events_coll.find_one(doc! { "_id": &*event_id }).await {
        Ok(Some(event)) => event,
        Ok(None) => return HttpResponse::NotFound().body("Event not found"),
        Err(e) => {
            error!("Error fetching event: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching event");
        }
    };

    let challenges = match fetch_all_challenges(&data).await {
        Ok(challenges) => challenges,
        Err(e) => {
            error!("Error fetching challenges: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching challenges");
        }
    };

    let related: Vec<&Challenge> = related_challenges(&event.event_type, &challenges, Utc::now());
    HttpResponse::Ok().json(related)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_capacity(max: i32, volunteers: &[&str]) -> VolunteerEvent {
        VolunteerEvent {
            event_id: "e1".to_string(),
            title: "river cleanup".to_string(),
            description: String::new(),
            event_type: "cleanup".to_string(),
            date: Utc::now(),
            location: "riverbank".to_string(),
            max_volunteers: max,
            volunteers: volunteers.iter().map(|v| v.to_string()).collect(),
            duration_hours: 3.0,
            created_by: "coordinator".to_string(),
            created_at: Utc::now(),
        }
    }

    // Twin of the store's $addToSet on the volunteer array.
    fn apply_join(event: &mut VolunteerEvent, user: &str) {
        if !event.volunteers.iter().any(|v| v == user) {
            event.volunteers.push(user.to_string());
        }
    }

    #[test]
    fn joining_twice_leaves_the_set_unchanged() {
        let mut event = event_with_capacity(10, &[]);
        assert!(check_join(&event, "ada").is_ok());
        apply_join(&mut event, "ada");
        assert_eq!(event.volunteers.len(), 1);

        assert!(check_join(&event, "ada").is_ok());
        apply_join(&mut event, "ada");
        assert_eq!(event.volunteers.len(), 1);
    }

    #[test]
    fn full_event_rejects_newcomers_but_not_members() {
        let event = event_with_capacity(2, &["ada", "bob"]);
        assert!(check_join(&event, "carol").is_err());
        // Already a volunteer: the re-join no-op is still allowed.
        assert!(check_join(&event, "ada").is_ok());
    }
}

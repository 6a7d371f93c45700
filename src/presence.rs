// src/presence.rs
//
// Heartbeat-backed presence. Each user has one record carrying
// `last_seen` and `connected`; online/away/offline is derived at read
// time against the caller's clock and never written back.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::Serialize;
use log::error;

use crate::app_state::AppState;
use crate::db::MongoDB;
use crate::models::PresenceRecord;

/// Seen within the last minute.
pub const ONLINE_THRESHOLD_SECS: i64 = 60;
/// Seen within the last five minutes.
pub const AWAY_THRESHOLD_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
        }
    }
}

/// Thresholds are half-open: exactly 60 s of silence is away, exactly
/// 300 s is offline. A disconnected record is offline regardless of how
/// recent its last heartbeat was.
pub fn presence_status(
    now: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    connected: bool,
) -> PresenceStatus {
    let elapsed = (now - last_seen).num_seconds();
    if elapsed >= AWAY_THRESHOLD_SECS || !connected {
        return PresenceStatus::Offline;
    }
    if elapsed < ONLINE_THRESHOLD_SECS {
        PresenceStatus::Online
    } else {
        PresenceStatus::Away
    }
}

/// Upserts the heartbeat record. Shared by the HTTP endpoint and the
/// websocket session's 30-second beat.
pub async fn touch_presence(db: &MongoDB, user_id: &str) {
    let presence = db.db.collection::<PresenceRecord>("userPresence");
    let update = doc! {
        "$set": {
            "last_seen": Utc::now().to_rfc3339(),
            "connected": true,
        }
    };
    if let Err(e) = presence
        .update_one(doc! { "user_id": user_id }, update)
        .upsert(true)
        .await
    {
        error!("Error writing presence heartbeat for {}: {}", user_id, e);
    }
}

/// Best-effort teardown write. Losing it is fine: the elapsed-time
/// cutoff catches the record eventually.
pub async fn mark_offline(db: &MongoDB, user_id: &str) {
    let presence = db.db.collection::<PresenceRecord>("userPresence");
    let update = doc! { "$set": { "connected": false } };
    if let Err(e) = presence.update_one(doc! { "user_id": user_id }, update).await {
        error!("Error writing presence teardown for {}: {}", user_id, e);
    }
}

#[derive(Debug, Serialize)]
pub struct PresenceView {
    pub user_id: String,
    pub last_seen: DateTime<Utc>,
    pub status: &'static str,
}

// POST /presence/heartbeat
pub async fn heartbeat(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    touch_presence(&data.mongodb, &current_user).await;
    HttpResponse::Ok().json(serde_json::json!({ "status": "online" }))
}

// POST /presence/offline
pub async fn go_offline(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    mark_offline(&data.mongodb, &current_user).await;
    HttpResponse::Ok().json(serde_json::json!({ "status": "offline" }))
}

// GET /presence
// Every presence record with its status derived against the server
// clock at this instant.
pub async fn list_presence(data: web::Data<AppState>) -> impl Responder {
    let presence = data.mongodb.db.collection::<PresenceRecord>("userPresence");
    let mut cursor = match presence.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching presence: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching presence");
        }
    };

    let now = Utc::now();
    let mut views = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(record) => views.push(PresenceView {
                status: presence_status(now, record.last_seen, record.connected).as_str(),
                user_id: record.user_id,
                last_seen: record.last_seen,
            }),
            Err(e) => {
                error!("Error iterating presence: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating presence");
            }
        }
    }
    HttpResponse::Ok().json(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn status_at(secs_ago: i64, connected: bool) -> PresenceStatus {
        let now = Utc::now();
        presence_status(now, now - Duration::seconds(secs_ago), connected)
    }

    #[test]
    fn recent_heartbeat_is_online() {
        assert_eq!(status_at(0, true), PresenceStatus::Online);
        assert_eq!(status_at(30, true), PresenceStatus::Online);
        assert_eq!(status_at(59, true), PresenceStatus::Online);
    }

    #[test]
    fn stale_heartbeat_is_away() {
        assert_eq!(status_at(60, true), PresenceStatus::Away); // boundary
        assert_eq!(status_at(120, true), PresenceStatus::Away);
        assert_eq!(status_at(299, true), PresenceStatus::Away);
    }

    #[test]
    fn silent_heartbeat_is_offline() {
        assert_eq!(status_at(300, true), PresenceStatus::Offline); // boundary
        assert_eq!(status_at(600, true), PresenceStatus::Offline);
    }

    #[test]
    fn disconnected_is_offline_even_when_recent() {
        assert_eq!(status_at(5, false), PresenceStatus::Offline);
        assert_eq!(status_at(120, false), PresenceStatus::Offline);
    }
}

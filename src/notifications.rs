// src/notifications.rs
//
// Per-target-user notification documents. Reads filter on equality only
// (no composite index required) and sort in the handler. Mark-all-read
// deliberately issues one update per unread document.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt;
use mongodb::bson::doc;
use log::error;

use crate::app_state::AppState;
use crate::models::Notification;

// GET /notifications/{user_id}
pub async fn get_notifications(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if current_user != *user_id {
        return HttpResponse::Unauthorized().body("Cannot read another user's notifications");
    }

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let filter = doc! { "target_user_id": &*user_id };
    let mut cursor = match notifications.find(filter).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching notifications: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching notifications");
        }
    };

    let mut results: Vec<Notification> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(notification) => results.push(notification),
            Err(e) => {
                error!("Error iterating notifications: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating notifications");
            }
        }
    }
    // Newest first, sorted here rather than by the store.
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    HttpResponse::Ok().json(results)
}

// POST /notifications/{notification_id}/read
pub async fn mark_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let filter = doc! { "_id": &*notification_id, "target_user_id": &current_user };
    match notifications.update_one(filter, doc! { "$set": { "read": true } }).await {
        Ok(res) if res.matched_count == 0 => HttpResponse::NotFound().body("Notification not found"),
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "read": true })),
        Err(e) => {
            error!("Error marking notification read: {}", e);
            HttpResponse::InternalServerError().body("Error marking notification read")
        }
    }
}

// POST /notifications/read_all
// One update per unread document, in sequence.
pub async fn mark_all_read(req: HttpRequest, data: web::Data<AppState>) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let notifications = data.mongodb.db.collection::<Notification>("notifications");
    let filter = doc! { "target_user_id": &current_user, "read": false };
    let mut cursor = match notifications.find(filter).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching unread notifications: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching unread notifications");
        }
    };

    let mut unread = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(notification) => unread.push(notification),
            Err(e) => {
                error!("Error iterating unread notifications: {}", e);
                return HttpResponse::InternalServerError()
                    .body("Error iterating unread notifications");
            }
        }
    }

    let mut updated = 0u64;
    for notification in &unread {
        let filter = doc! { "_id": &notification.notification_id };
        match notifications.update_one(filter, doc! { "$set": { "read": true } }).await {
            Ok(res) => updated += res.modified_count,
            Err(e) => {
                error!("Error marking notification read: {}", e);
                return HttpResponse::InternalServerError().body("Error marking notifications read");
            }
        }
    }
    HttpResponse::Ok().json(serde_json::json!({ "marked_read": updated }))
}

// src/community.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;
use crate::hub_server::BroadcastAnnouncement;
use crate::models::{Announcement, CommunityMessage};

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PostAnnouncementRequest {
    pub title: String,
    pub body: String,
}

// GET /community/messages
pub async fn get_messages(data: web::Data<AppState>) -> impl Responder {
    let messages = data.mongodb.db.collection::<CommunityMessage>("communityMessages");
    let mut cursor = match messages.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching messages: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching messages");
        }
    };

    let mut results: Vec<CommunityMessage> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(message) => results.push(message),
            Err(e) => {
                error!("Error iterating messages: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating messages");
            }
        }
    }
    results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    HttpResponse::Ok().json(results)
}

// POST /community/messages
pub async fn post_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<PostMessageRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };
    if payload.content.trim().is_empty() {
        return HttpResponse::BadRequest().body("Message must not be empty");
    }

    let new_message = CommunityMessage {
        message_id: Uuid::new_v4().to_string(),
        sender_id: current_user,
        content: payload.content.clone(),
        created_at: Utc::now(),
    };

    let messages = data.mongodb.db.collection::<CommunityMessage>("communityMessages");
    match messages.insert_one(&new_message).await {
        Ok(_) => {
            let payload = serde_json::json!({
                "type": "community_message",
                "message_id": new_message.message_id,
                "sender_id": new_message.sender_id,
                "content": new_message.content,
            })
            .to_string();
            data.hub_server.do_send(BroadcastAnnouncement { payload });
            HttpResponse::Ok().json(new_message)
        }
        Err(e) => {
            error!("Error posting message: {}", e);
            HttpResponse::InternalServerError().body("Error posting message")
        }
    }
}

// GET /community/announcements
pub async fn get_announcements(data: web::Data<AppState>) -> impl Responder {
    let announcements = data.mongodb.db.collection::<Announcement>("globalAnnouncements");
    let mut cursor = match announcements.find(doc! {}).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching announcements: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching announcements");
        }
    };

    let mut results: Vec<Announcement> = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(announcement) => results.push(announcement),
            Err(e) => {
                error!("Error iterating announcements: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating announcements");
            }
        }
    }
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    HttpResponse::Ok().json(results)
}

// POST /community/announcements
// Coordinator-only; pushed to every connected session.
pub async fn post_announcement(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<PostAnnouncementRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let users = data.mongodb.db.collection::<mongodb::bson::Document>("users");
    let coordinator_filter = doc! { "user_id": &current_user, "role": "coordinator" };
    if users.find_one(coordinator_filter).await.ok().flatten().is_none() {
        return HttpResponse::Unauthorized().body("Only coordinators can post announcements");
    }

    let new_announcement = Announcement {
        announcement_id: Uuid::new_v4().to_string(),
        author_id: current_user,
        title: payload.title.clone(),
        body: payload.body.clone(),
        created_at: Utc::now(),
    };

    let announcements = data.mongodb.db.collection::<Announcement>("globalAnnouncements");
    match announcements.insert_one(&new_announcement).await {
        Ok(_) => {
            info!("Announcement posted: {}", new_announcement.announcement_id);
            let payload = serde_json::json!({
                "type": "announcement",
                "announcement_id": new_announcement.announcement_id,
                "title": new_announcement.title,
                "body": new_announcement.body,
            })
            .to_string();
            data.hub_server.do_send(BroadcastAnnouncement { payload });
            HttpResponse::Ok().json(new_announcement)
        }
        Err(e) => {
            error!("Error posting announcement: {}", e);
            HttpResponse::InternalServerError().body("Error posting announcement")
        }
    }
}

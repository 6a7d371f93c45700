use actix_web::{web, HttpResponse, Responder};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use log::error;

use crate::app_state::AppState;
use crate::models::VolunteerProfile;

/// What other members are allowed to see of a user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub query: String,
}

// GET /users/find_user_email?query=...
// Case-insensitive substring match on the email address.
pub async fn find_user_email(
    data: web::Data<AppState>,
    query: web::Query<EmailQuery>,
) -> impl Responder {
    let users = data.mongodb.db.collection::<PublicUser>("users");
    let filter = doc! { "email": { "$regex": &query.query, "$options": "i" } };
    match users.find_one(filter).await {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Error searching user by email: {}", e);
            HttpResponse::InternalServerError().body("Error searching user")
        }
    }
}

// GET /users/get/{id}
pub async fn get_user_by_id(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let users = data.mongodb.db.collection::<PublicUser>("users");
    match users.find_one(doc! { "user_id": &*user_id }).await {
        Ok(Some(user)) => HttpResponse::Ok().json(user),
        Ok(None) => HttpResponse::NotFound().body("User not found"),
        Err(e) => {
            error!("Error fetching user: {}", e);
            HttpResponse::InternalServerError().body("Error fetching user")
        }
    }
}

// GET /users/profile/{user_id}
// Volunteer profile; a user who never joined an event has none yet.
pub async fn get_volunteer_profile(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let profiles = data.mongodb.db.collection::<VolunteerProfile>("volunteerProfiles");
    match profiles.find_one(doc! { "user_id": &*user_id }).await {
        Ok(Some(profile)) => HttpResponse::Ok().json(profile),
        Ok(None) => HttpResponse::NotFound().body("No volunteer profile yet"),
        Err(e) => {
            error!("Error fetching volunteer profile: {}", e);
            HttpResponse::InternalServerError().body("Error fetching volunteer profile")
        }
    }
}

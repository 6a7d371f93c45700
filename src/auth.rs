use actix_web::{web, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::doc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    /// "member" or "coordinator". Coordinators create challenges, events
    /// and announcements; the role is assigned out of band, never via
    /// signup.
    pub role: String,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

pub fn create_jwt(user_id: &str, secret: &str) -> String {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
}

pub fn email_is_valid(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> impl Responder {
    if !email_is_valid(&signup_info.email) {
        return HttpResponse::BadRequest().body("Invalid email address");
    }

    let users_collection = data.mongodb.db.collection::<User>("users");

    // Reject duplicate usernames up front.
    match users_collection.find_one(doc! { "username": &signup_info.username }).await {
        Ok(Some(_)) => return HttpResponse::BadRequest().body("Username already taken"),
        Ok(None) => {}
        Err(e) => {
            error!("Error checking username: {}", e);
            return HttpResponse::InternalServerError().body("Error checking username");
        }
    }

    let hashed_password = match hash(&signup_info.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => return HttpResponse::InternalServerError().body("Error hashing password"),
    };

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        username: signup_info.username.clone(),
        email: signup_info.email.clone(),
        password: hashed_password,
        role: "member".to_string(),
        created_at: Utc::now(),
    };

    match users_collection.insert_one(&new_user).await {
        Ok(_) => {
            info!("User {} signed up", new_user.user_id);
            HttpResponse::Ok().json(serde_json::json!({ "status": "User created" }))
        }
        Err(e) => HttpResponse::InternalServerError().body(format!("Error: {:?}", e)),
    }
}

pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginInfo>,
) -> impl Responder {
    let users_collection = data.mongodb.db.collection::<User>("users");
    let user_doc = users_collection
        .find_one(doc! { "username": &login_info.username })
        .await;

    match user_doc {
        Ok(Some(user)) => {
            if verify(&login_info.password, &user.password).unwrap_or(false) {
                let token = create_jwt(&user.user_id, &data.config.jwt_secret);
                HttpResponse::Ok().json(serde_json::json!({
                    "token": token,
                    "user_id": user.user_id,
                    "role": user.role,
                }))
            } else {
                HttpResponse::Unauthorized().body("Invalid credentials")
            }
        }
        Ok(None) => HttpResponse::Unauthorized().body("User not found"),
        Err(_) => HttpResponse::InternalServerError().body("Error logging in"),
    }
}

#[cfg(test)]
mod tests {
    use super::email_is_valid;

    #[test]
    fn accepts_plain_addresses() {
        assert!(email_is_valid("ada@example.org"));
        assert!(email_is_valid("first.last@city.council.gov"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!email_is_valid("not-an-email"));
        assert!(!email_is_valid("missing@tld"));
        assert!(!email_is_valid("two@@example.org"));
        assert!(!email_is_valid(""));
    }
}

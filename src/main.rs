// src/main.rs

mod app_state;
mod auth;
mod challenges;
mod community;
mod config;
mod crosslink;
mod db;
mod events;
mod hub_server;
mod items;
mod models;
mod notifications;
mod presence;
mod reference;
mod rewards;
mod swap;
mod user_management;
mod web_socket_server;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::info;

use crate::app_state::AppState;
use crate::auth::{login, signup, Claims};
use crate::challenges::{create_challenge, get_related_events, join_challenge, list_challenges};
use crate::community::{get_announcements, get_messages, post_announcement, post_message};
use crate::events::{
    create_event, get_related_challenges, join_event, leave_event, list_events, record_attendance,
};
use crate::items::{create_item, delete_item, get_item, list_completed_swaps, list_items};
use crate::notifications::{get_notifications, mark_all_read, mark_read};
use crate::presence::{go_offline, heartbeat, list_presence};
use crate::rewards::get_user_stats;
use crate::swap::{accept_request, cancel_request, complete_swap, decline_request, request_swap};
use crate::user_management::{find_user_email, get_user_by_id, get_volunteer_profile};
use crate::web_socket_server::ws_index;

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token) {
                        Ok(user_id) => {
                            // Insert user_id as a string extension
                            req.extensions_mut().insert(user_id);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str) -> Result<String, String> {
    let secret = env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    ) {
        Ok(token_data) => Ok(token_data.claims.sub),
        Err(e) => Err(format!("Token decode error: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    // Start the notification hub actor, which fans out to websocket sessions
    let hub_server = hub_server::HubServer::new(mongodb.clone()).start();

    let frontend_origin = config.frontend_origin.clone();

    info!("Server running at http://0.0.0.0:8080");
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                hub_server: hub_server.clone(),
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
            )
            // SWAP MARKETPLACE
            .service(
                web::scope("/items")
                    .route("", web::post().to(create_item))
                    .route("", web::get().to(list_items))
                    .service(
                        web::scope("/{item_id}")
                            .route("", web::get().to(get_item))
                            .route("", web::delete().to(delete_item))
                            .service(
                                web::scope("/swap")
                                    .route("/request", web::post().to(request_swap))
                                    .route("/cancel", web::post().to(cancel_request))
                                    .route("/accept", web::post().to(accept_request))
                                    .route("/decline", web::post().to(decline_request))
                                    .route("/complete", web::post().to(complete_swap))
                            )
                    )
            )
            .service(
                web::scope("/swaps")
                    .route("/completed/{user_id}", web::get().to(list_completed_swaps))
            )
            // CHALLENGES
            .service(
                web::scope("/challenges")
                    .route("", web::post().to(create_challenge))
                    .route("", web::get().to(list_challenges))
                    .route("/{challenge_id}/join", web::post().to(join_challenge))
                    .route("/{challenge_id}/related_events", web::get().to(get_related_events))
            )
            // VOLUNTEER EVENTS
            .service(
                web::scope("/events")
                    .route("", web::post().to(create_event))
                    .route("", web::get().to(list_events))
                    .route("/{event_id}/join", web::post().to(join_event))
                    .route("/{event_id}/leave", web::post().to(leave_event))
                    .route("/{event_id}/attendance", web::post().to(record_attendance))
                    .route("/{event_id}/related_challenges", web::get().to(get_related_challenges))
            )
            // LEDGER-BACKED STATS
            .service(
                web::scope("/stats")
                    .route("/{user_id}", web::get().to(get_user_stats))
            )
            // PRESENCE
            .service(
                web::scope("/presence")
                    .route("", web::get().to(list_presence))
                    .route("/heartbeat", web::post().to(heartbeat))
                    .route("/offline", web::post().to(go_offline))
            )
            // NOTIFICATIONS
            .service(
                web::scope("/notifications")
                    .route("/read_all", web::post().to(mark_all_read))
                    .route("/{user_id}", web::get().to(get_notifications))
                    .route("/{notification_id}/read", web::post().to(mark_read))
            )
            // COMMUNITY FEED
            .service(
                web::scope("/community")
                    .route("/messages", web::get().to(get_messages))
                    .route("/messages", web::post().to(post_message))
                    .route("/announcements", web::get().to(get_announcements))
                    .route("/announcements", web::post().to(post_announcement))
            )
            // READ-ONLY REFERENCE DATA
            .service(
                web::scope("/reference")
                    .route("/projects", web::get().to(reference::list_projects))
                    .route("/hotspots", web::get().to(reference::list_hotspots))
                    .route("/schedules", web::get().to(reference::list_schedules))
            )
            // USERS
            .service(
                web::scope("/users")
                    .route("/find_user_email", web::get().to(find_user_email))
                    .route("/get/{id}", web::get().to(get_user_by_id))
                    .route("/profile/{user_id}", web::get().to(get_volunteer_profile))
            )
            // WEBSOCKET route for real-time
            .service(
                web::resource("/ws").route(web::get().to(ws_index))
            )
    })
        .bind("0.0.0.0:8080")?
        .run()
        .await
}

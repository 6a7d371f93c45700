//! Read-only reference collections (seeded out of band, never written
//! by this service): local green projects, pollution hotspots and waste
//! collection schedules.

use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use log::error;

use crate::app_state::AppState;

/* -------------------------------------------------------------------------- */
/* Models                                                                     */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProject {
    #[serde(rename = "_id")]
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollutionHotspot {
    #[serde(rename = "_id")]
    pub hotspot_id: String,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    /// "low", "medium" or "high"
    pub severity: String,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchedule {
    #[serde(rename = "_id")]
    pub schedule_id: String,
    pub area: String,
    pub weekday: String,
    pub waste_type: String,
    pub notes: Option<String>,
}

/* -------------------------------------------------------------------------- */
/* Handlers                                                                   */
/* -------------------------------------------------------------------------- */

async fn list_collection<T>(data: &AppState, name: &str) -> Result<Vec<T>, mongodb::error::Error>
where
    T: serde::de::DeserializeOwned + Send + Sync,
{
    let coll = data.mongodb.db.collection::<T>(name);
    let mut cursor = coll.find(doc! {}).await?;
    let mut results = Vec::new();
    while let Some(res) = cursor.next().await {
        results.push(res?);
    }
    Ok(results)
}

// GET /reference/projects
pub async fn list_projects(data: web::Data<AppState>) -> impl Responder {
    match list_collection::<LocalProject>(&data, "localProjects").await {
        Ok(projects) => HttpResponse::Ok().json(projects),
        Err(e) => {
            error!("Error fetching local projects: {}", e);
            HttpResponse::InternalServerError().body("Error fetching local projects")
        }
    }
}

// GET /reference/hotspots
pub async fn list_hotspots(data: web::Data<AppState>) -> impl Responder {
    match list_collection::<PollutionHotspot>(&data, "pollutionHotspots").await {
        Ok(hotspots) => HttpResponse::Ok().json(hotspots),
        Err(e) => {
            error!("Error fetching pollution hotspots: {}", e);
            HttpResponse::InternalServerError().body("Error fetching pollution hotspots")
        }
    }
}

// GET /reference/schedules
pub async fn list_schedules(data: web::Data<AppState>) -> impl Responder {
    match list_collection::<CollectionSchedule>(&data, "collectionSchedules").await {
        Ok(schedules) => HttpResponse::Ok().json(schedules),
        Err(e) => {
            error!("Error fetching collection schedules: {}", e);
            HttpResponse::InternalServerError().body("Error fetching collection schedules")
        }
    }
}

// src/items.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::doc;
use serde::Deserialize;
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;
use crate::models::{CompletedSwap, SwapItem};

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub condition: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub category: Option<String>,
}

// POST /items
pub async fn create_item(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateItemRequest>,
) -> impl Responder {
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    if payload.title.trim().is_empty() {
        return HttpResponse::BadRequest().body("Title must not be empty");
    }

    let new_item = SwapItem {
        item_id: Uuid::new_v4().to_string(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        category: payload.category.clone(),
        condition: payload.condition.clone(),
        owner_id: current_user,
        is_available: true,
        swap_requests: vec![],
        accepted_requests: vec![],
        swapped_with: None,
        swapped_at: None,
        accepted_at: None,
        version: 0,
        created_at: Utc::now(),
    };

    let items_coll = data.mongodb.db.collection::<SwapItem>("swapItems");
    match items_coll.insert_one(&new_item).await {
        Ok(_) => {
            info!("Item listed: {}", new_item.item_id);
            HttpResponse::Ok().json(&new_item)
        }
        Err(e) => {
            error!("Error creating item: {}", e);
            HttpResponse::InternalServerError().body("Error creating item")
        }
    }
}

// GET /items?category=...
// Lists available items, optionally filtered by category.
pub async fn list_items(
    data: web::Data<AppState>,
    query: web::Query<ItemQuery>,
) -> impl Responder {
    let items_coll = data.mongodb.db.collection::<SwapItem>("swapItems");
    let mut filter = doc! { "is_available": true };
    if let Some(category) = &query.category {
        filter.insert("category", category);
    }

    let mut cursor = match items_coll.find(filter).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching items: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching items");
        }
    };

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(item) => items.push(item),
            Err(e) => {
                error!("Error iterating items: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating items");
            }
        }
    }
    HttpResponse::Ok().json(items)
}

// GET /items/{item_id}
pub async fn get_item(
    data: web::Data<AppState>,
    item_id: web::Path<String>,
) -> impl Responder {
    let items_coll = data.mongodb.db.collection::<SwapItem>("swapItems");
    match items_coll.find_one(doc! { "_id": &*item_id }).await {
        Ok(Some(item)) => HttpResponse::Ok().json(item),
        Ok(None) => HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            HttpResponse::InternalServerError().body("Error fetching item")
        }
    }
}

// DELETE /items/{item_id}
// Owner withdraws a listing. Completed items keep their audit record and
// stay in place; only the listing document goes away.
pub async fn delete_item(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = data.mongodb.db.collection::<SwapItem>("swapItems");
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };
    if item.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only the owner can delete an item");
    }

    match items_coll.delete_one(doc! { "_id": &item_id }).await {
        Ok(res) if res.deleted_count == 1 => HttpResponse::Ok().body("Item deleted"),
        Ok(_) => HttpResponse::NotFound().body("Item not found or already deleted"),
        Err(e) => {
            error!("Error deleting item: {}", e);
            HttpResponse::InternalServerError().body("Error deleting item")
        }
    }
}

// GET /swaps/completed/{user_id}
// Swap history for a user, on either side of the trade.
pub async fn list_completed_swaps(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> impl Responder {
    let completed_coll = data.mongodb.db.collection::<CompletedSwap>("completedSwaps");
    let filter = doc! {
        "$or": [
            { "owner_id": &*user_id },
            { "requester_id": &*user_id },
        ]
    };

    let mut cursor = match completed_coll.find(filter).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Error fetching completed swaps: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching completed swaps");
        }
    };

    let mut swaps = Vec::new();
    while let Some(res) = cursor.next().await {
        match res {
            Ok(swap) => swaps.push(swap),
            Err(e) => {
                error!("Error iterating completed swaps: {}", e);
                return HttpResponse::InternalServerError().body("Error iterating completed swaps");
            }
        }
    }
    swaps.sort_by(|a: &CompletedSwap, b: &CompletedSwap| b.completed_at.cmp(&a.completed_at));
    HttpResponse::Ok().json(swaps)
}

// src/swap.rs
//
// Negotiation lifecycle for one swap item. Per (item, requester) pair the
// states are NONE → PENDING → ACCEPTED → COMPLETED, with decline/cancel
// edges back to NONE from PENDING and ACCEPTED. Nothing leaves COMPLETED.
//
// Every mutation is a compare-and-swap: the update filter carries the
// `version` read just before, and the update increments it. A concurrent
// writer makes `matched_count` come back 0 and the handler answers 409 so
// the caller re-reads. That serializes Accept racing Decline on the same
// requester, which plain read-modify-write on the arrays would not.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use mongodb::bson::doc;
use serde::Deserialize;
use log::{error, info};

use crate::app_state::AppState;
use crate::hub_server::PublishNotification;
use crate::models::{CompletedSwap, SwapItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    None,
    Pending,
    Accepted,
    Completed,
}

/// Where one user stands in an item's lifecycle.
pub fn swap_state(item: &SwapItem, user_id: &str) -> SwapState {
    if item.swapped_with.as_deref() == Some(user_id) {
        SwapState::Completed
    } else if item.accepted_requests.iter().any(|u| u == user_id) {
        SwapState::Accepted
    } else if item.swap_requests.iter().any(|u| u == user_id) {
        SwapState::Pending
    } else {
        SwapState::None
    }
}

pub fn check_request(item: &SwapItem, user_id: &str) -> Result<(), &'static str> {
    if !item.is_available {
        return Err("Item is no longer available");
    }
    if item.owner_id == user_id {
        return Err("You cannot request your own item");
    }
    match swap_state(item, user_id) {
        SwapState::None => Ok(()),
        SwapState::Pending => Err("You already requested this item"),
        SwapState::Accepted => Err("Your request was already accepted"),
        SwapState::Completed => Err("This swap is already completed"),
    }
}

pub fn check_accept(item: &SwapItem, requester_id: &str) -> Result<(), &'static str> {
    if !item.is_available {
        return Err("Item is no longer available");
    }
    match swap_state(item, requester_id) {
        SwapState::Pending => Ok(()),
        _ => Err("No pending request from this user"),
    }
}

pub fn check_complete(item: &SwapItem, requester_id: &str) -> Result<(), &'static str> {
    if !item.is_available {
        return Err("Item is no longer available");
    }
    match swap_state(item, requester_id) {
        SwapState::Accepted => Ok(()),
        _ => Err("Request must be accepted before completing"),
    }
}

#[derive(Debug, Deserialize)]
pub struct RequesterPayload {
    pub requester_id: String,
}

fn items(data: &AppState) -> mongodb::Collection<SwapItem> {
    data.mongodb.db.collection::<SwapItem>("swapItems")
}

// POST /items/{item_id}/swap/request
// Adds the authenticated user to the item's pending requesters.
pub async fn request_swap(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = items(&data);
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };

    if let Err(reason) = check_request(&item, &current_user) {
        return HttpResponse::BadRequest().body(reason);
    }

    let filter = doc! { "_id": &item_id, "version": item.version };
    let update = doc! {
        "$addToSet": { "swap_requests": &current_user },
        "$inc": { "version": 1 },
    };
    match items_coll.update_one(filter, update).await {
        Ok(res) if res.matched_count == 0 => {
            HttpResponse::Conflict().body("Item was modified concurrently, retry")
        }
        Ok(_) => {
            info!("User {} requested item {}", current_user, item_id);
            data.hub_server.do_send(PublishNotification {
                target_user_id: item.owner_id.clone(),
                kind: "swap_request".to_string(),
                body: format!("New swap request for \"{}\"", item.title),
            });
            HttpResponse::Ok().json(serde_json::json!({ "state": "pending" }))
        }
        Err(e) => {
            error!("Error requesting swap: {}", e);
            HttpResponse::InternalServerError().body("Error requesting swap")
        }
    }
}

// POST /items/{item_id}/swap/cancel
// The requester withdraws their own pending request.
pub async fn cancel_request(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = items(&data);
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };

    let filter = doc! { "_id": &item_id, "version": item.version };
    let update = doc! {
        "$pull": { "swap_requests": &current_user },
        "$inc": { "version": 1 },
    };
    match items_coll.update_one(filter, update).await {
        Ok(res) if res.matched_count == 0 => {
            HttpResponse::Conflict().body("Item was modified concurrently, retry")
        }
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "state": "none" })),
        Err(e) => {
            error!("Error cancelling request: {}", e);
            HttpResponse::InternalServerError().body("Error cancelling request")
        }
    }
}

// POST /items/{item_id}/swap/accept
// Owner approves one pending requester: a single update moves the user
// between the two arrays so they never appear in both.
pub async fn accept_request(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
    payload: web::Json<RequesterPayload>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = items(&data);
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };

    if item.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only the owner can accept requests");
    }
    if let Err(reason) = check_accept(&item, &payload.requester_id) {
        return HttpResponse::BadRequest().body(reason);
    }

    let filter = doc! { "_id": &item_id, "version": item.version };
    let update = doc! {
        "$pull": { "swap_requests": &payload.requester_id },
        "$addToSet": { "accepted_requests": &payload.requester_id },
        "$set": { "accepted_at": Utc::now().to_rfc3339() },
        "$inc": { "version": 1 },
    };
    match items_coll.update_one(filter, update).await {
        Ok(res) if res.matched_count == 0 => {
            HttpResponse::Conflict().body("Item was modified concurrently, retry")
        }
        Ok(_) => {
            info!("Owner accepted {} for item {}", payload.requester_id, item_id);
            data.hub_server.do_send(PublishNotification {
                target_user_id: payload.requester_id.clone(),
                kind: "swap_accepted".to_string(),
                body: format!("Your request for \"{}\" was accepted", item.title),
            });
            HttpResponse::Ok().json(serde_json::json!({ "state": "accepted" }))
        }
        Err(e) => {
            error!("Error accepting request: {}", e);
            HttpResponse::InternalServerError().body("Error accepting request")
        }
    }
}

// POST /items/{item_id}/swap/decline
// Owner removes a requester from both arrays. Idempotent: declining a
// user who is in neither array is a no-op.
pub async fn decline_request(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
    payload: web::Json<RequesterPayload>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = items(&data);
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };

    if item.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only the owner can decline requests");
    }

    let filter = doc! { "_id": &item_id, "version": item.version };
    let update = doc! {
        "$pull": {
            "swap_requests": &payload.requester_id,
            "accepted_requests": &payload.requester_id,
        },
        "$inc": { "version": 1 },
    };
    match items_coll.update_one(filter, update).await {
        Ok(res) if res.matched_count == 0 => {
            HttpResponse::Conflict().body("Item was modified concurrently, retry")
        }
        Ok(_) => {
            data.hub_server.do_send(PublishNotification {
                target_user_id: payload.requester_id.clone(),
                kind: "swap_declined".to_string(),
                body: format!("Your request for \"{}\" was declined", item.title),
            });
            HttpResponse::Ok().json(serde_json::json!({ "state": "none" }))
        }
        Err(e) => {
            error!("Error declining request: {}", e);
            HttpResponse::InternalServerError().body("Error declining request")
        }
    }
}

// POST /items/{item_id}/swap/complete
// Owner finishes the swap with one accepted requester. The audit record
// goes in first (its _id is the item id, so it is exactly-once), then the
// availability flip. A crash between the two is healed by retrying; the
// duplicate-key on the insert just means an earlier run got that far.
pub async fn complete_swap(
    req: HttpRequest,
    data: web::Data<AppState>,
    item_id: web::Path<String>,
    payload: web::Json<RequesterPayload>,
) -> impl Responder {
    let item_id = item_id.into_inner();
    let current_user = match req.extensions().get::<String>() {
        Some(uid) => uid.clone(),
        None => return HttpResponse::Unauthorized().body("Unauthorized"),
    };

    let items_coll = items(&data);
    let item = match items_coll.find_one(doc! { "_id": &item_id }).await {
        Ok(Some(item)) => item,
        Ok(None) => return HttpResponse::NotFound().body("Item not found"),
        Err(e) => {
            error!("Error fetching item: {}", e);
            return HttpResponse::InternalServerError().body("Error fetching item");
        }
    };

    if item.owner_id != current_user {
        return HttpResponse::Unauthorized().body("Only the owner can complete a swap");
    }
    if let Err(reason) = check_complete(&item, &payload.requester_id) {
        return HttpResponse::BadRequest().body(reason);
    }

    let completed_at = Utc::now();
    let record = CompletedSwap {
        item_id: item_id.clone(),
        title: item.title.clone(),
        category: item.category.clone(),
        owner_id: item.owner_id.clone(),
        requester_id: payload.requester_id.clone(),
        completed_at,
    };
    let completed_coll = data.mongodb.db.collection::<CompletedSwap>("completedSwaps");
    if let Err(e) = completed_coll.insert_one(&record).await {
        let duplicate = matches!(
            *e.kind,
            mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
                if we.code == 11000
        );
        if !duplicate {
            error!("Error writing completed swap record: {}", e);
            return HttpResponse::InternalServerError().body("Error recording swap");
        }
    }

    let filter = doc! { "_id": &item_id, "version": item.version };
    let update = doc! {
        "$set": {
            "is_available": false,
            "swapped_with": &payload.requester_id,
            "swapped_at": completed_at.to_rfc3339(),
        },
        "$inc": { "version": 1 },
    };
    match items_coll.update_one(filter, update).await {
        Ok(res) if res.matched_count == 0 => {
            HttpResponse::Conflict().body("Item was modified concurrently, retry")
        }
        Ok(_) => {
            info!("Swap completed: item {} with {}", item_id, payload.requester_id);
            data.hub_server.do_send(PublishNotification {
                target_user_id: payload.requester_id.clone(),
                kind: "swap_completed".to_string(),
                body: format!("Swap completed for \"{}\"", item.title),
            });
            HttpResponse::Ok().json(record)
        }
        Err(e) => {
            error!("Error completing swap: {}", e);
            HttpResponse::InternalServerError().body("Error completing swap")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(owner: &str) -> SwapItem {
        SwapItem {
            item_id: "i1".to_string(),
            title: "bike trailer".to_string(),
            description: String::new(),
            category: "transport".to_string(),
            condition: "good".to_string(),
            owner_id: owner.to_string(),
            is_available: true,
            swap_requests: vec![],
            accepted_requests: vec![],
            swapped_with: None,
            swapped_at: None,
            accepted_at: None,
            version: 0,
            created_at: Utc::now(),
        }
    }

    // In-memory twins of the guarded updates, used to walk the state
    // machine in tests.
    fn apply_request(item: &mut SwapItem, user: &str) {
        if !item.swap_requests.iter().any(|u| u == user) {
            item.swap_requests.push(user.to_string());
        }
        item.version += 1;
    }

    fn apply_accept(item: &mut SwapItem, user: &str) {
        item.swap_requests.retain(|u| u != user);
        if !item.accepted_requests.iter().any(|u| u == user) {
            item.accepted_requests.push(user.to_string());
        }
        item.accepted_at = Some(Utc::now());
        item.version += 1;
    }

    fn apply_decline(item: &mut SwapItem, user: &str) {
        item.swap_requests.retain(|u| u != user);
        item.accepted_requests.retain(|u| u != user);
        item.version += 1;
    }

    fn apply_complete(item: &mut SwapItem, user: &str) {
        item.is_available = false;
        item.swapped_with = Some(user.to_string());
        item.swapped_at = Some(Utc::now());
        item.version += 1;
    }

    fn in_both(item: &SwapItem, user: &str) -> bool {
        item.swap_requests.iter().any(|u| u == user)
            && item.accepted_requests.iter().any(|u| u == user)
    }

    #[test]
    fn request_preconditions() {
        let mut it = item("owner");
        assert!(check_request(&it, "owner").is_err());
        assert!(check_request(&it, "ada").is_ok());

        apply_request(&mut it, "ada");
        assert!(check_request(&it, "ada").is_err()); // duplicate

        apply_accept(&mut it, "ada");
        assert!(check_request(&it, "ada").is_err()); // already accepted

        it.is_available = false;
        assert!(check_request(&it, "bob").is_err());
    }

    #[test]
    fn user_never_in_both_arrays() {
        let mut it = item("owner");
        apply_request(&mut it, "ada");
        assert!(!in_both(&it, "ada"));
        assert_eq!(swap_state(&it, "ada"), SwapState::Pending);

        apply_accept(&mut it, "ada");
        assert!(!in_both(&it, "ada"));
        assert_eq!(swap_state(&it, "ada"), SwapState::Accepted);

        apply_decline(&mut it, "ada");
        assert!(!in_both(&it, "ada"));
        assert_eq!(swap_state(&it, "ada"), SwapState::None);
    }

    #[test]
    fn accept_requires_pending() {
        let mut it = item("owner");
        assert!(check_accept(&it, "ada").is_err());
        apply_request(&mut it, "ada");
        assert!(check_accept(&it, "ada").is_ok());
        apply_accept(&mut it, "ada");
        assert!(check_accept(&it, "ada").is_err()); // already moved over
    }

    #[test]
    fn complete_only_reachable_from_accepted() {
        let mut it = item("owner");
        assert!(check_complete(&it, "ada").is_err());
        apply_request(&mut it, "ada");
        assert!(check_complete(&it, "ada").is_err()); // pending is not enough
        apply_accept(&mut it, "ada");
        assert!(check_complete(&it, "ada").is_ok());
    }

    #[test]
    fn full_round_trip_cannot_complete_twice() {
        let mut it = item("owner");
        apply_request(&mut it, "ada");
        apply_accept(&mut it, "ada");
        assert!(check_complete(&it, "ada").is_ok());
        apply_complete(&mut it, "ada");

        assert!(!it.is_available);
        assert_eq!(swap_state(&it, "ada"), SwapState::Completed);
        // A second Complete fails the precondition, so no second audit
        // record is ever written.
        assert!(check_complete(&it, "ada").is_err());
    }

    #[test]
    fn decline_is_idempotent() {
        let mut it = item("owner");
        apply_decline(&mut it, "ghost");
        assert!(it.swap_requests.is_empty());
        assert!(it.accepted_requests.is_empty());
    }

    #[test]
    fn concurrent_requesters_are_independent() {
        let mut it = item("owner");
        apply_request(&mut it, "ada");
        apply_request(&mut it, "bob");
        apply_accept(&mut it, "ada");
        assert_eq!(swap_state(&it, "ada"), SwapState::Accepted);
        assert_eq!(swap_state(&it, "bob"), SwapState::Pending);
        apply_decline(&mut it, "bob");
        assert_eq!(swap_state(&it, "ada"), SwapState::Accepted);
        assert_eq!(swap_state(&it, "bob"), SwapState::None);
    }
}

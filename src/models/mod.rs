use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A swappable physical good listed by one user.
///
/// `swap_requests` holds pending requesters, `accepted_requests` the
/// owner-approved ones. A user id may appear in at most one of the two
/// arrays at a time; every mutation below goes through the guarded
/// updates in `swap.rs`. `version` is the optimistic-concurrency token
/// those updates compare-and-swap on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SwapItem {
    #[serde(rename = "_id")]
    pub item_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// e.g. "new", "good", "worn"
    pub condition: String,
    pub owner_id: String,
    pub is_available: bool,
    pub swap_requests: Vec<String>,
    pub accepted_requests: Vec<String>,
    pub swapped_with: Option<String>,
    pub swapped_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record of one completed swap.
///
/// Its `_id` is the item id, so the store's unique key makes the record
/// exactly-once per item.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompletedSwap {
    #[serde(rename = "_id")]
    pub item_id: String,
    pub title: String,
    pub category: String,
    pub owner_id: String,
    pub requester_id: String,
    pub completed_at: DateTime<Utc>,
}

/// A time-boxed eco-action campaign with a participation set and a badge.
///
/// `participants` is append-only (there is no leave operation). Status
/// (upcoming/active/completed) is never stored; it is derived from the
/// time window by `challenges::challenge_status`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Challenge {
    #[serde(rename = "_id")]
    pub challenge_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub participants: Vec<String>,
    pub target_actions: i32,
    pub badge: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A scheduled in-person activity with a capacity-bounded volunteer set.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VolunteerEvent {
    #[serde(rename = "_id")]
    pub event_id: String,
    pub title: String,
    pub description: String,
    /// One of "cleanup", "tree-planting", "workshop", "community-service".
    pub event_type: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub max_volunteers: i32,
    pub volunteers: Vec<String>,
    pub duration_hours: f64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user volunteering profile, upserted on first event join.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VolunteerProfile {
    pub user_id: String,
    pub upcoming_events: Vec<String>,
    pub attended_events: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only ledger entry for one point-awarding user activity.
///
/// The `_id` is deterministic (UUIDv5 over the identifying fields, see
/// `rewards::action_id`), so re-applying the same award collides on the
/// unique key and becomes a no-op. Stats are folded from this ledger,
/// never kept as stored counters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionRecord {
    #[serde(rename = "_id")]
    pub action_id: String,
    pub user_id: String,
    /// "event_join", "event_attended" or "challenge_progress".
    pub kind: String,
    pub points: i32,
    pub challenge_id: Option<String>,
    pub event_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregates folded from the action ledger and the volunteer profile.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserStats {
    pub user_id: String,
    pub total_actions: i64,
    pub total_points: i64,
    pub total_hours: f64,
    pub events_attended: i64,
    pub badges: Vec<String>,
}

/// Per-user heartbeat document. Online/away/offline is derived at read
/// time from `last_seen` and `connected`, never stored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PresenceRecord {
    pub user_id: String,
    pub last_seen: DateTime<Utc>,
    pub connected: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub notification_id: String,
    pub target_user_id: String,
    /// e.g. "swap_request", "swap_accepted", "swap_completed", "announcement"
    pub kind: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommunityMessage {
    #[serde(rename = "_id")]
    pub message_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Coordinator-authored broadcast shown to every member.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Announcement {
    #[serde(rename = "_id")]
    pub announcement_id: String,
    pub author_id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

use crate::db::MongoDB;
use crate::models::Notification;
use actix::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use log::{error, info};

#[derive(Message)]
#[rtype(result = "()")]
pub enum WsMessage {
    Notice(String),
    Announcement(String),
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub user_id: String,
    pub addr: Recipient<WsMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub user_id: String,
    pub addr: Recipient<WsMessage>,
}

/// Persist a notification document, then push it to every live session
/// of the target user.
#[derive(Message)]
#[rtype(result = "()")]
pub struct PublishNotification {
    pub target_user_id: String,
    pub kind: String,
    pub body: String,
}

/// Push an already-persisted payload to every connected session.
#[derive(Message)]
#[rtype(result = "()")]
pub struct BroadcastAnnouncement {
    pub payload: String,
}

pub struct HubServer {
    // Multiple connections per user (several tabs) are expected.
    sessions: HashMap<String, Vec<Recipient<WsMessage>>>,
    db: Arc<MongoDB>,
}

impl HubServer {
    pub fn new(db: Arc<MongoDB>) -> Self {
        HubServer {
            sessions: HashMap::new(),
            db,
        }
    }
}

impl Actor for HubServer {
    type Context = Context<Self>;
}

impl Handler<Connect> for HubServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        info!("User {} connected (WS)", msg.user_id);
        self.sessions
            .entry(msg.user_id.clone())
            .or_default()
            .push(msg.addr);
    }
}

impl Handler<Disconnect> for HubServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.user_id);
        if let Some(addrs) = self.sessions.get_mut(&msg.user_id) {
            // Remove only the connection that matches the provided address.
            addrs.retain(|a| a != &msg.addr);
            if addrs.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<PublishNotification> for HubServer {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, msg: PublishNotification, _: &mut Context<Self>) -> Self::Result {
        let db = self.db.clone();
        let sessions_map = self.sessions.clone();
        Box::pin(async move {
            let notification = Notification {
                notification_id: uuid::Uuid::new_v4().to_string(),
                target_user_id: msg.target_user_id.clone(),
                kind: msg.kind.clone(),
                body: msg.body.clone(),
                read: false,
                created_at: Utc::now(),
            };
            let notifications = db.db.collection::<Notification>("notifications");
            if let Err(e) = notifications.insert_one(&notification).await {
                error!("Error persisting notification: {}", e);
                return;
            }

            if let Some(ws_addrs) = sessions_map.get(&msg.target_user_id) {
                let payload = serde_json::json!({
                    "type": notification.kind,
                    "body": notification.body,
                    "notification_id": notification.notification_id,
                })
                .to_string();
                for addr in ws_addrs {
                    addr.do_send(WsMessage::Notice(payload.clone()));
                }
            }
        })
    }
}

impl Handler<BroadcastAnnouncement> for HubServer {
    type Result = ();

    fn handle(&mut self, msg: BroadcastAnnouncement, _: &mut Context<Self>) {
        for addrs in self.sessions.values() {
            for addr in addrs {
                addr.do_send(WsMessage::Announcement(msg.payload.clone()));
            }
        }
    }
}

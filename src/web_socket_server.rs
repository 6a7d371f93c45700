use actix::prelude::*;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use log::warn;

use crate::app_state::AppState;
use crate::db::MongoDB;
use crate::hub_server::{Connect, Disconnect, HubServer, WsMessage};
use crate::presence;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
/// How often a live session refreshes its presence record.
const PRESENCE_BEAT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct IncomingMessage {
    #[serde(rename = "type")]
    msg_type: String,
}

pub struct WsSession {
    pub user_id: String,
    pub hb: Instant,
    pub hub: Addr<HubServer>,
    pub db: Arc<MongoDB>,
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.presence_beat(ctx);

        self.hub.do_send(Connect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });

        let db = self.db.clone();
        let user_id = self.user_id.clone();
        actix::spawn(async move {
            presence::touch_presence(&db, &user_id).await;
        });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });

        // Best-effort teardown write; the elapsed-time cutoff covers the
        // case where it never lands.
        let db = self.db.clone();
        let user_id = self.user_id.clone();
        actix::spawn(async move {
            presence::mark_offline(&db, &user_id).await;
        });
    }
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn presence_beat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(PRESENCE_BEAT, |act, _ctx| {
            let db = act.db.clone();
            let user_id = act.user_id.clone();
            actix::spawn(async move {
                presence::touch_presence(&db, &user_id).await;
            });
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                // The client only speaks one message: an explicit
                // presence refresh.
                if let Ok(incoming) = serde_json::from_str::<IncomingMessage>(&text) {
                    if incoming.msg_type == "heartbeat" {
                        self.hb = Instant::now();
                        let db = self.db.clone();
                        let user_id = self.user_id.clone();
                        actix::spawn(async move {
                            presence::touch_presence(&db, &user_id).await;
                        });
                    }
                }
            }
            Ok(ws::Message::Close(_)) => {
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<WsMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: WsMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            WsMessage::Notice(payload) => ctx.text(payload),
            WsMessage::Announcement(payload) => ctx.text(payload),
        }
    }
}

#[derive(Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
}

// GET /ws
// The user id comes from the bearer token when the client sends one, or
// from the query string (browsers cannot set headers on websocket
// upgrades).
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, actix_web::Error> {
    let from_token = req.extensions().get::<String>().cloned();
    let user_id = match from_token.or_else(|| query.user_id.clone()) {
        Some(uid) => uid,
        None => return Ok(HttpResponse::Unauthorized().body("Unauthorized")),
    };

    ws::start(
        WsSession {
            user_id,
            hb: Instant::now(),
            hub: data.hub_server.clone(),
            db: data.mongodb.clone(),
        },
        &req,
        stream,
    )
}

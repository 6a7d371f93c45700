use crate::config::Config;
use crate::db::MongoDB;
use crate::hub_server::HubServer;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub hub_server: Addr<HubServer>,
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
}

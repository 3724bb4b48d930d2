use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::gateway::GatewayVerifier;
use crate::notify::{Notifier, OutboxNotifier};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub notifier: Box<dyn Notifier>,
    pub gateway: Option<Box<dyn GatewayVerifier>>,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            db: None,
            notifier: Box::new(OutboxNotifier),
            gateway: None,
        }
    }
}

use std::path::PathBuf;

use crate::model::Role;
use rusqlite::Connection;
use serde::Deserialize;

/// Identity asserted by the upstream auth layer. Recorded, never verified.
#[derive(Debug, Deserialize, Clone)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub caller: Option<Caller>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

use crate::db;
use crate::ipc::helpers::{params, respond, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

#[derive(Deserialize)]
struct SelectParams {
    path: PathBuf,
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: SelectParams = params(req)?;
    let conn = db::open_db(&p.path).map_err(|e| {
        tracing::error!(path = %p.path.display(), error = ?e, "workspace open failed");
        HandlerErr::new("db_open_failed", format!("{e:#}"))
    })?;
    tracing::info!(path = %p.path.display(), "workspace selected");
    state.workspace = Some(p.path.clone());
    state.db = Some(conn);
    Ok(json!({ "workspacePath": p.path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(respond(req, handle_health(state, req))),
        "workspace.select" => Some(respond(req, handle_workspace_select(state, req))),
        _ => None,
    }
}

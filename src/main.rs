mod attendance;
mod dates;
mod db;
mod entities;
mod error;
mod fees;
mod ipc;
mod model;
mod relations;
mod results;
mod store;
mod views;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use serde_json::json;
use tracing_subscriber::EnvFilter;

const WORKSPACE_ENV: &str = "SCHOOLD_WORKSPACE";

fn init_tracing() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn initial_state() -> ipc::AppState {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = std::env::var_os(WORKSPACE_ENV).map(PathBuf::from) {
        match db::open_db(&path) {
            Ok(conn) => {
                tracing::info!(path = %path.display(), "workspace opened from environment");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::error!(path = %path.display(), error = ?e, "workspace from environment failed to open"),
        }
    }
    state
}

fn main() {
    init_tracing();
    let mut state = initial_state();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schoold ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                let span = tracing::info_span!(
                    "request",
                    method = %req.method,
                    request_id = %req.id,
                    caller_id = req.caller.as_ref().map(|c| c.id.as_str()),
                    caller_role = req.caller.as_ref().map(|c| c.role.as_str()),
                );
                let _guard = span.enter();
                let resp = ipc::handle_request(&mut state, req);
                if let Some(code) = resp.pointer("/error/code").and_then(|v| v.as_str()) {
                    tracing::debug!(code, "request failed");
                }
                resp
            }
            // No id to echo back.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };

        let out = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        if writeln!(stdout, "{out}").and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }
}

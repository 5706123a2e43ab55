use crate::ipc::helpers::{conn, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::results::GradingPolicy;
use serde::Deserialize;

fn handle_grading_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    let policy = match state.db.as_ref() {
        Some(conn) => GradingPolicy::load(conn)?,
        None => GradingPolicy::default(),
    };
    keyed("policy", policy)
}

#[derive(Deserialize)]
struct SetParams {
    policy: GradingPolicy,
}

fn handle_grading_set(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: SetParams = params(req)?;
    p.policy.validate()?;
    p.policy.save(conn)?;
    tracing::info!(pass = p.policy.pass_percentage, bands = p.policy.bands.len(), "grading policy saved");
    keyed("policy", p.policy)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.grading.get" => Some(respond(req, handle_grading_get(state, req))),
        "settings.grading.set" => Some(respond(req, handle_grading_set(state, req))),
        _ => None,
    }
}

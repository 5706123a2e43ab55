use crate::entities::{self, NewUser};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdParams {
    user_id: String,
}

fn handle_users_register(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: NewUser = params(req)?;
    keyed("user", entities::register_user(conn, input)?)
}

fn handle_users_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "users": [] }));
    };
    keyed("users", entities::list_users(conn)?)
}

fn handle_users_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UserIdParams = params(req)?;
    keyed("user", entities::get_user(conn, &p.user_id)?)
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UserIdParams = params(req)?;
    entities::delete_user(conn, &p.user_id)?;
    deleted()
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.register" => handle_users_register(state, req),
        "users.list" => handle_users_list(state, req),
        "users.get" => handle_users_get(state, req),
        "users.delete" => handle_users_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

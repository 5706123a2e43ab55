use crate::entities::{self, ClassPatch};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::views;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassIdParams {
    class_id: String,
}

#[derive(Deserialize)]
struct CreateParams {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    class_id: String,
    #[serde(flatten)]
    patch: ClassPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForMemberParams {
    role: Role,
    member_id: String,
}

fn handle_classes_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    keyed("classes", views::class_overview(conn)?)
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: CreateParams = params(req)?;
    let class = entities::create_class(conn, &p.name)?;
    Ok(json!({ "classId": class.id, "class": class }))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    keyed("class", views::class_detail(conn, &p.class_id)?)
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    entities::update_class(conn, &p.class_id, p.patch)?;
    keyed("class", views::class_detail(conn, &p.class_id)?)
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    entities::delete_class(conn, &p.class_id)?;
    deleted()
}

fn handle_classes_for_member(state: &mut AppState, req: &Request) -> HandlerResult {
    let p: ForMemberParams = params(req)?;
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };
    keyed("classes", views::classes_for_member(conn, p.role, &p.member_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.get" => handle_classes_get(state, req),
        "classes.update" => handle_classes_update(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        "classes.forMember" => handle_classes_for_member(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::entities;
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::relations;
use crate::views;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct CreateParams {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectIdParams {
    subject_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignParams {
    class_id: String,
    subject_ids: Vec<String>,
    teacher_ids: Option<Vec<String>>,
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: CreateParams = params(req)?;
    keyed("subject", entities::create_subject(conn, &p.name)?)
}

fn handle_subjects_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    keyed("subjects", views::subject_overview(conn, entities::list_subjects(conn)?)?)
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: SubjectIdParams = params(req)?;
    entities::delete_subject(conn, &p.subject_id)?;
    deleted()
}

fn handle_subjects_assign_to_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: AssignParams = params(req)?;
    relations::assign_subjects_to_class(conn, &p.class_id, &p.subject_ids, p.teacher_ids.as_deref())?;
    keyed("class", views::class_detail(conn, &p.class_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        "subjects.assignToClass" => handle_subjects_assign_to_class(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

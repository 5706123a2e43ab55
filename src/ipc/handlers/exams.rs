use crate::entities::{self, ExamPatch, NewExam};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::views;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExamIdParams {
    exam_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassIdParams {
    class_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    exam_id: String,
    #[serde(flatten)]
    patch: ExamPatch,
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: NewExam = params(req)?;
    let exam = entities::create_exam(conn, input)?;
    keyed("exam", views::exam_overview(conn, vec![exam])?.pop())
}

fn handle_exams_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "exams": [] }));
    };
    keyed("exams", views::exam_overview(conn, entities::list_exams(conn)?)?)
}

fn handle_exams_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    let exam = entities::update_exam(conn, &p.exam_id, p.patch)?;
    keyed("exam", views::exam_overview(conn, vec![exam])?.pop())
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ExamIdParams = params(req)?;
    entities::delete_exam(conn, &p.exam_id)?;
    deleted()
}

fn handle_exams_by_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    keyed("exams", views::exam_overview(conn, entities::exams_for_class(conn, &p.class_id)?)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exams.create" => handle_exams_create(state, req),
        "exams.list" => handle_exams_list(state, req),
        "exams.update" => handle_exams_update(state, req),
        "exams.delete" => handle_exams_delete(state, req),
        "exams.byClass" => handle_exams_by_class(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::ExamResult;
use crate::results::{self, GradingPolicy, MarksEdit, NewResult};
use crate::views;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    result_id: String,
    subjects: Vec<MarksEdit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultIdParams {
    result_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentIdParams {
    student_id: String,
}

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

fn render(conn: &Connection, key: &str, list: Vec<ExamResult>) -> HandlerResult {
    let policy = GradingPolicy::load(conn)?;
    keyed(key, views::result_views(conn, list, &policy)?)
}

fn render_one(conn: &Connection, result: ExamResult) -> HandlerResult {
    let policy = GradingPolicy::load(conn)?;
    keyed("result", views::result_views(conn, vec![result], &policy)?.pop())
}

fn handle_results_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: NewResult = params(req)?;
    render_one(conn, results::create_result(conn, input)?)
}

fn handle_results_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    render_one(conn, results::update_result(conn, &p.result_id, &p.subjects)?)
}

fn handle_results_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ResultIdParams = params(req)?;
    results::delete_result(conn, &p.result_id)?;
    deleted()
}

fn handle_results_by_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentIdParams = params(req)?;
    render(conn, "results", results::by_student(conn, &p.student_id)?)
}

fn handle_results_by_exam(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ExamIdParams = params(req)?;
    render(conn, "results", results::by_exam(conn, &p.exam_id)?)
}

fn handle_results_by_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    render(conn, "results", results::by_class(conn, &p.class_id)?)
}

fn handle_results_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "results": [] }));
    };
    render(conn, "results", results::all(conn)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.create" => handle_results_create(state, req),
        "results.update" => handle_results_update(state, req),
        "results.delete" => handle_results_delete(state, req),
        "results.byStudent" => handle_results_by_student(state, req),
        "results.byExam" => handle_results_by_exam(state, req),
        "results.byClass" => handle_results_by_class(state, req),
        "results.list" => handle_results_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

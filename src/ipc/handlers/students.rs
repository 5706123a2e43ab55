use crate::entities::{self, NewStudent, StudentPatch};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, to_json, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::relations;
use crate::views;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentIdParams {
    student_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassIdParams {
    class_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    student_id: String,
    #[serde(flatten)]
    patch: StudentPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignParams {
    student_id: String,
    class_id: String,
}

fn profile(conn: &Connection, student_id: &str) -> HandlerResult {
    let student = entities::get_student(conn, student_id)?;
    let mut profiles = views::student_profiles(conn, vec![student])?;
    keyed("student", profiles.pop())
}

fn handle_students_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: NewStudent = params(req)?;
    let student = entities::create_student(conn, input)?;
    profile(conn, &student.id)
}

fn handle_students_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "students": [] }));
    };
    keyed("students", views::student_profiles(conn, entities::list_students(conn)?)?)
}

fn handle_students_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentIdParams = params(req)?;
    profile(conn, &p.student_id)
}

fn handle_students_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    entities::update_student(conn, &p.student_id, p.patch)?;
    profile(conn, &p.student_id)
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentIdParams = params(req)?;
    entities::delete_student(conn, &p.student_id)?;
    deleted()
}

fn handle_students_by_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    to_json(views::class_students(conn, &p.class_id)?)
}

fn handle_students_assign_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: AssignParams = params(req)?;
    let changed = relations::assign_student_to_class(conn, &p.student_id, &p.class_id)?;
    let mut out = profile(conn, &p.student_id)?;
    out["changed"] = json!(changed);
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.byClass" => handle_students_by_class(state, req),
        "students.assignClass" => handle_students_assign_class(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::entities::{self, NewTeacher, TeacherPatch};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::relations;
use crate::views;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherIdParams {
    teacher_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    teacher_id: String,
    #[serde(flatten)]
    patch: TeacherPatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachParams {
    teacher_id: String,
    class_ids: Vec<String>,
}

fn profile(conn: &Connection, teacher_id: &str) -> HandlerResult {
    let teacher = entities::get_teacher(conn, teacher_id)?;
    keyed("teacher", views::teacher_profiles(conn, vec![teacher])?.pop())
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: NewTeacher = params(req)?;
    let teacher = entities::create_teacher(conn, input)?;
    profile(conn, &teacher.id)
}

fn handle_teachers_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "teachers": [] }));
    };
    keyed("teachers", views::teacher_profiles(conn, entities::list_teachers(conn)?)?)
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: TeacherIdParams = params(req)?;
    profile(conn, &p.teacher_id)
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    entities::update_teacher(conn, &p.teacher_id, p.patch)?;
    profile(conn, &p.teacher_id)
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: TeacherIdParams = params(req)?;
    entities::delete_teacher(conn, &p.teacher_id)?;
    deleted()
}

fn handle_teachers_attach_classes(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: AttachParams = params(req)?;
    relations::attach_teacher_to_classes(conn, &p.teacher_id, &p.class_ids)?;
    profile(conn, &p.teacher_id)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.create" => handle_teachers_create(state, req),
        "teachers.list" => handle_teachers_list(state, req),
        "teachers.get" => handle_teachers_get(state, req),
        "teachers.update" => handle_teachers_update(state, req),
        "teachers.delete" => handle_teachers_delete(state, req),
        "teachers.attachClasses" => handle_teachers_attach_classes(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

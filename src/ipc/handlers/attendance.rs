use crate::attendance::{self, MarkAttendance};
use crate::dates;
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::views;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentMonthParams {
    student_id: String,
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassParams {
    class_id: String,
    date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherClassParams {
    teacher_id: String,
    class_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    student_id: String,
    class_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceIdParams {
    attendance_id: String,
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let input: MarkAttendance = params(req)?;
    let record = attendance::mark(conn, input)?;
    keyed("attendance", views::attendance_views(conn, vec![record])?.pop())
}

fn handle_attendance_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: AttendanceIdParams = params(req)?;
    let record = attendance::get(conn, &p.attendance_id)?;
    keyed("attendance", views::attendance_views(conn, vec![record])?.pop())
}

fn handle_attendance_by_student_month(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentMonthParams = params(req)?;
    let records = attendance::by_student_and_month(conn, &p.student_id, p.year, p.month)?;
    keyed("records", views::attendance_views(conn, records)?)
}

fn handle_attendance_by_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassParams = params(req)?;
    let day = p.date.as_deref().map(|d| dates::parse_day("date", d)).transpose()?;
    let records = attendance::by_class(conn, &p.class_id, day)?;
    keyed("records", views::attendance_views(conn, records)?)
}

fn handle_attendance_by_teacher_class(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: TeacherClassParams = params(req)?;
    let records = attendance::by_teacher_and_class(conn, &p.teacher_id, &p.class_id)?;
    keyed("records", views::attendance_views(conn, records)?)
}

fn handle_attendance_by_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentParams = params(req)?;
    let records = attendance::by_student(conn, &p.student_id)?;
    keyed("records", views::attendance_views(conn, records)?)
}

fn handle_attendance_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: StudentParams = params(req)?;
    keyed("summary", attendance::summary(conn, &p.student_id, p.class_id.as_deref())?)
}

fn handle_attendance_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: AttendanceIdParams = params(req)?;
    attendance::delete(conn, &p.attendance_id)?;
    deleted()
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.mark" => handle_attendance_mark(state, req),
        "attendance.get" => handle_attendance_get(state, req),
        "attendance.byStudentMonth" => handle_attendance_by_student_month(state, req),
        "attendance.byClass" => handle_attendance_by_class(state, req),
        "attendance.byTeacherClass" => handle_attendance_by_teacher_class(state, req),
        "attendance.byStudent" => handle_attendance_by_student(state, req),
        "attendance.summary" => handle_attendance_summary(state, req),
        "attendance.delete" => handle_attendance_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::fees::{self, FeePatch, NewFee};
use crate::ipc::helpers::{conn, deleted, keyed, params, respond, to_json, Clock, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;

#[derive(Deserialize)]
struct CreateParams {
    #[serde(flatten)]
    fee: NewFee,
    #[serde(flatten)]
    clock: Clock,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    fee_id: String,
    #[serde(flatten)]
    patch: FeePatch,
    #[serde(flatten)]
    clock: Clock,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeIdParams {
    fee_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearParams {
    student_id: String,
    year: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassIdParams {
    class_id: String,
}

fn handle_fees_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: CreateParams = params(req)?;
    let now = p.clock.now()?;
    keyed("fee", fees::create_fee(conn, p.fee, now)?)
}

fn handle_fees_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: UpdateParams = params(req)?;
    let now = p.clock.now()?;
    keyed("fee", fees::edit_fee(conn, &p.fee_id, p.patch, now)?)
}

fn handle_fees_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: FeeIdParams = params(req)?;
    fees::delete_fee(conn, &p.fee_id)?;
    deleted()
}

fn handle_fees_yearly_summary(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: YearParams = params(req)?;
    to_json(fees::yearly_summary(conn, &p.student_id, p.year)?)
}

fn handle_fees_class_roster(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = conn(state)?;
    let p: ClassIdParams = params(req)?;
    to_json(fees::class_roster(conn, &p.class_id)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "fees.create" => handle_fees_create(state, req),
        "fees.update" => handle_fees_update(state, req),
        "fees.delete" => handle_fees_delete(state, req),
        "fees.yearlySummary" => handle_fees_yearly_summary(state, req),
        "fees.classRoster" => handle_fees_class_roster(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

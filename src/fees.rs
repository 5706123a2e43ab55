//! One monetary obligation per student per calendar month.

use crate::dates::{self, MONTH_NAMES};
use crate::entities;
use crate::error::{map_unique, CoreError, CoreResult};
use crate::model::{Fee, FeeStatus};
use crate::store::{self, atomically, EntityKind};
use crate::views::{Resolver, StudentRef};
use chrono::{Datelike, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFee {
    pub student_id: String,
    pub amount: f64,
    pub due_date: String,
    pub status: Option<FeeStatus>,
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePatch {
    pub amount: Option<f64>,
    pub due_date: Option<String>,
    pub payment_date: Option<String>,
    pub status: Option<FeeStatus>,
}

const COLUMNS: &str = "id, student_id, amount, due_date, status, payment_date";
const DUPLICATE_MONTH: &str = "Fee for this student already exists in this month";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Fee> {
    Ok(Fee {
        id: r.get(0)?,
        student_id: r.get(1)?,
        amount: r.get(2)?,
        due_date: r.get(3)?,
        status: r.get(4)?,
        payment_date: r.get(5)?,
    })
}

fn check_amount(amount: f64) -> CoreResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(CoreError::validation("amount must be a non-negative number"));
    }
    Ok(())
}

fn month_taken(conn: &Connection, student_id: &str, due_month: &str, except: Option<&str>) -> CoreResult<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM fees WHERE student_id = ? AND due_month = ?",
            (student_id, due_month),
            |r| r.get(0),
        )
        .optional()?;
    Ok(matches!(hit, Some(found) if Some(found.as_str()) != except))
}

/// True when another of the student's fees already resolves to the same
/// effective (year, month) as `fee`.
fn effective_month_taken(conn: &Connection, fee: &Fee, except: Option<&str>) -> CoreResult<bool> {
    let key = dates::month_key(&fee.effective_date());
    Ok(fees_for_student(conn, &fee.student_id)?
        .iter()
        .filter(|other| Some(other.id.as_str()) != except)
        .any(|other| dates::month_key(&other.effective_date()) == key))
}

pub fn get_fee(conn: &Connection, id: &str) -> CoreResult<Fee> {
    conn.query_row(&format!("SELECT {COLUMNS} FROM fees WHERE id = ?"), [id], from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found(EntityKind::Fee.label(), id))
}

pub fn fees_for_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<Fee>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM fees WHERE student_id = ? ORDER BY due_date, id"
    ))?;
    let fees = stmt
        .query_map([student_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fees)
}

/// Create a fee and append it to the student's fee history.
///
/// `now` anchors both the "due today or later" rule and the default payment
/// date of a fee created as paid.
pub fn create_fee(conn: &Connection, input: NewFee, now: NaiveDateTime) -> CoreResult<Fee> {
    check_amount(input.amount)?;
    let due_date = dates::parse_instant("dueDate", &input.due_date)?;
    let explicit_payment = dates::parse_optional_instant("paymentDate", input.payment_date.as_deref())?;
    store::require(conn, EntityKind::Student, &input.student_id)?;
    if due_date < dates::start_of_day(&now) {
        return Err(CoreError::invalid_state("Due date must be today or a future date"));
    }
    let due_month = dates::month_key(&due_date);
    if month_taken(conn, &input.student_id, &due_month, None)? {
        tracing::debug!(student_id = %input.student_id, due_month = %due_month, "duplicate fee month rejected");
        return Err(CoreError::duplicate(DUPLICATE_MONTH));
    }

    let status = input.status.unwrap_or(FeeStatus::Unpaid);
    let payment_date = match status {
        FeeStatus::Paid => Some(explicit_payment.unwrap_or(now)),
        FeeStatus::Unpaid => None,
    };
    let fee = Fee {
        id: store::new_id(),
        student_id: input.student_id,
        amount: input.amount,
        due_date,
        status,
        payment_date,
    };
    if effective_month_taken(conn, &fee, None)? {
        tracing::debug!(student_id = %fee.student_id, "fee collides with another fee's effective month");
        return Err(CoreError::duplicate(DUPLICATE_MONTH));
    }
    atomically(conn, |tx| {
        tx.execute(
            "INSERT INTO fees(id, student_id, amount, due_date, due_month, status, payment_date)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &fee.id,
                &fee.student_id,
                fee.amount,
                fee.due_date,
                &due_month,
                fee.status,
                fee.payment_date,
            ),
        )
        .map_err(|e| map_unique(e, DUPLICATE_MONTH))?;
        store::push_student_fee(tx, &fee.student_id, &fee.id)
    })?;
    tracing::info!(fee_id = %fee.id, student_id = %fee.student_id, due_month = %due_month, "fee created");
    Ok(fee)
}

/// Partial edit. An explicit `paid` sets the payment date (given or `now`);
/// an explicit `unpaid` clears it. Without a status the current one stays.
pub fn edit_fee(conn: &Connection, id: &str, patch: FeePatch, now: NaiveDateTime) -> CoreResult<Fee> {
    let mut fee = get_fee(conn, id)?;
    if let Some(amount) = patch.amount {
        check_amount(amount)?;
        fee.amount = amount;
    }
    if let Some(raw) = patch.due_date.as_deref() {
        fee.due_date = dates::parse_instant("dueDate", raw)?;
    }
    let explicit_payment = dates::parse_optional_instant("paymentDate", patch.payment_date.as_deref())?;
    match patch.status {
        Some(FeeStatus::Paid) => {
            fee.status = FeeStatus::Paid;
            fee.payment_date = Some(explicit_payment.unwrap_or(now));
        }
        Some(FeeStatus::Unpaid) => {
            fee.status = FeeStatus::Unpaid;
            fee.payment_date = None;
        }
        None => {
            if fee.status == FeeStatus::Paid {
                if let Some(at) = explicit_payment {
                    fee.payment_date = Some(at);
                }
            }
        }
    }

    let due_month = dates::month_key(&fee.due_date);
    if month_taken(conn, &fee.student_id, &due_month, Some(id))?
        || effective_month_taken(conn, &fee, Some(id))?
    {
        return Err(CoreError::duplicate(DUPLICATE_MONTH));
    }
    conn.execute(
        "UPDATE fees SET amount = ?, due_date = ?, due_month = ?, status = ?, payment_date = ?
         WHERE id = ?",
        (fee.amount, fee.due_date, &due_month, fee.status, fee.payment_date, id),
    )
    .map_err(|e| map_unique(e, DUPLICATE_MONTH))?;
    tracing::info!(fee_id = id, status = fee.status.as_str(), "fee updated");
    Ok(fee)
}

/// Delete a fee and retract it from the student's fee history.
pub fn delete_fee(conn: &Connection, id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        store::delete_row(tx, EntityKind::Fee, id)?;
        tx.execute("DELETE FROM student_fees WHERE fee_id = ?", [id])?;
        tracing::info!(fee_id = id, "fee deleted");
        Ok(())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFee {
    pub month: &'static str,
    pub fee_id: Option<String>,
    pub amount: Option<f64>,
    /// `paid`, `unpaid` or `not assigned`.
    pub status: &'static str,
    pub due_date: Option<NaiveDateTime>,
    pub payment_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySummary {
    pub student_id: String,
    pub student: Option<String>,
    pub year: i32,
    pub records: Vec<MonthlyFee>,
}

/// Twelve entries, January first. Each month shows the fee whose effective
/// date (payment date when paid, else due date) falls in that year and month.
pub fn yearly_summary(conn: &Connection, student_id: &str, year: i32) -> CoreResult<YearlySummary> {
    store::require(conn, EntityKind::Student, student_id)?;
    let fees = fees_for_student(conn, student_id)?;
    let student = Resolver::new(conn).student(student_id)?.and_then(|s| s.name);

    let records = MONTH_NAMES
        .iter()
        .copied()
        .zip(1u32..)
        .map(|(name, month)| {
            let hit = fees.iter().find(|f| {
                let at = f.effective_date();
                at.year() == year && at.month() == month
            });
            match hit {
                Some(f) => MonthlyFee {
                    month: name,
                    fee_id: Some(f.id.clone()),
                    amount: Some(f.amount),
                    status: f.status.as_str(),
                    due_date: Some(f.due_date),
                    payment_date: f.payment_date,
                },
                None => MonthlyFee {
                    month: name,
                    fee_id: None,
                    amount: None,
                    status: "not assigned",
                    due_date: None,
                    payment_date: None,
                },
            }
        })
        .collect();

    Ok(YearlySummary {
        student_id: student_id.to_string(),
        student,
        year,
        records,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(flatten)]
    pub student: StudentRef,
    pub class_id: Option<String>,
    pub fees: Vec<Fee>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassFeeRoster {
    pub class_id: String,
    pub total_students: usize,
    pub records: Vec<RosterEntry>,
}

/// Every student in the class with their fee history in append order.
pub fn class_roster(conn: &Connection, class_id: &str) -> CoreResult<ClassFeeRoster> {
    store::require(conn, EntityKind::Class, class_id)?;
    let students = entities::students_in_class(conn, class_id)?;
    let mut resolver = Resolver::new(conn);
    let mut records = Vec::with_capacity(students.len());
    for s in students {
        let mut fees = Vec::with_capacity(s.fees_paid.len());
        for fee_id in &s.fees_paid {
            match get_fee(conn, fee_id) {
                Ok(fee) => fees.push(fee),
                Err(CoreError::NotFound { .. }) => {
                    tracing::warn!(student_id = %s.id, fee_id = %fee_id, "dangling fee reference");
                }
                Err(e) => return Err(e),
            }
        }
        let student = resolver
            .student(&s.id)?
            .unwrap_or_else(|| StudentRef::bare(&s.id, &s.roll_number));
        records.push(RosterEntry {
            student,
            class_id: s.class_id,
            fees,
        });
    }
    Ok(ClassFeeRoster {
        class_id: class_id.to_string(),
        total_students: records.len(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::entities::fixtures;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid date")
    }

    fn now() -> NaiveDateTime {
        at(2025, 1, 15)
    }

    fn seeded() -> (Connection, String, String) {
        let conn = open_memory();
        let class = fixtures::class(&conn, "10-A");
        let x = fixtures::student(&conn, "Student X", "R1", &class.id);
        (conn, x.id, class.id)
    }

    fn new_fee(student: &str, amount: f64, due: &str, status: Option<FeeStatus>, paid: Option<&str>) -> NewFee {
        NewFee {
            student_id: student.to_string(),
            amount,
            due_date: due.to_string(),
            status,
            payment_date: paid.map(str::to_string),
        }
    }

    #[test]
    fn second_fee_in_same_month_is_duplicate() {
        let (conn, x, _) = seeded();
        create_fee(&conn, new_fee(&x, 5000.0, "2025-06-10", Some(FeeStatus::Unpaid), None), now())
            .expect("first");
        let e = create_fee(&conn, new_fee(&x, 3000.0, "2025-06-20", Some(FeeStatus::Unpaid), None), now())
            .expect_err("second");
        assert_eq!(e.code(), "duplicate_record");
        create_fee(&conn, new_fee(&x, 3000.0, "2025-07-01", None, None), now()).expect("next month");
    }

    #[test]
    fn due_date_before_today_is_invalid_state() {
        let (conn, x, _) = seeded();
        let e = create_fee(&conn, new_fee(&x, 10.0, "2025-01-14", None, None), now()).expect_err("past");
        assert_eq!(e.code(), "invalid_state");
        // Earlier today is still today.
        create_fee(&conn, new_fee(&x, 10.0, "2025-01-15T00:00:00", None, None), now()).expect("today");
    }

    #[test]
    fn amount_must_be_finite_and_non_negative() {
        let (conn, x, _) = seeded();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let e = create_fee(&conn, new_fee(&x, bad, "2025-06-10", None, None), now()).expect_err("bad");
            assert_eq!(e.code(), "bad_params");
        }
    }

    #[test]
    fn paid_without_payment_date_defaults_to_now() {
        let (conn, x, _) = seeded();
        let fee = create_fee(&conn, new_fee(&x, 10.0, "2025-03-01", Some(FeeStatus::Paid), None), now())
            .expect("create");
        assert_eq!(fee.payment_date, Some(now()));
        let unpaid = create_fee(
            &conn,
            new_fee(&x, 10.0, "2025-04-01", Some(FeeStatus::Unpaid), Some("2025-03-30")),
            now(),
        )
        .expect("create");
        assert_eq!(unpaid.payment_date, None);
    }

    #[test]
    fn marking_unpaid_clears_payment_date() {
        let (conn, x, _) = seeded();
        let fee = create_fee(
            &conn,
            new_fee(&x, 5000.0, "2025-06-10", Some(FeeStatus::Paid), Some("2025-06-09")),
            now(),
        )
        .expect("create");
        assert_eq!(fee.payment_date, Some(at(2025, 6, 9).date().and_hms_opt(0, 0, 0).expect("t")));

        let edited = edit_fee(
            &conn,
            &fee.id,
            FeePatch {
                status: Some(FeeStatus::Unpaid),
                ..FeePatch::default()
            },
            now(),
        )
        .expect("edit");
        assert_eq!(edited.payment_date, None);
        assert_eq!(get_fee(&conn, &fee.id).expect("reload"), edited);
    }

    #[test]
    fn edit_without_status_keeps_payment() {
        let (conn, x, _) = seeded();
        let fee = create_fee(&conn, new_fee(&x, 100.0, "2025-06-10", Some(FeeStatus::Paid), None), now())
            .expect("create");
        let edited = edit_fee(
            &conn,
            &fee.id,
            FeePatch {
                amount: Some(120.0),
                ..FeePatch::default()
            },
            at(2025, 2, 1),
        )
        .expect("edit");
        assert_eq!(edited.amount, 120.0);
        assert_eq!(edited.status, FeeStatus::Paid);
        assert_eq!(edited.payment_date, Some(now()));
    }

    #[test]
    fn moving_due_date_onto_taken_month_is_duplicate() {
        let (conn, x, _) = seeded();
        create_fee(&conn, new_fee(&x, 1.0, "2025-06-10", None, None), now()).expect("june");
        let july = create_fee(&conn, new_fee(&x, 1.0, "2025-07-10", None, None), now()).expect("july");
        let e = edit_fee(
            &conn,
            &july.id,
            FeePatch {
                due_date: Some("2025-06-25".into()),
                ..FeePatch::default()
            },
            now(),
        )
        .expect_err("dup");
        assert_eq!(e.code(), "duplicate_record");
    }

    #[test]
    fn paid_fee_cannot_share_effective_month_with_another_fee() {
        let (conn, x, _) = seeded();
        // Due in July, paid in June: it occupies June on the calendar.
        let early = create_fee(
            &conn,
            new_fee(&x, 700.0, "2025-07-05", Some(FeeStatus::Paid), Some("2025-06-01")),
            now(),
        )
        .expect("early payment");
        let e = create_fee(&conn, new_fee(&x, 600.0, "2025-06-10", None, None), now()).expect_err("june");
        assert_eq!(e.code(), "duplicate_record");

        let august = create_fee(&conn, new_fee(&x, 600.0, "2025-08-10", None, None), now()).expect("august");
        let e = edit_fee(
            &conn,
            &august.id,
            FeePatch {
                status: Some(FeeStatus::Paid),
                payment_date: Some("2025-06-20".into()),
                ..FeePatch::default()
            },
            now(),
        )
        .expect_err("paid into june");
        assert_eq!(e.code(), "duplicate_record");
        assert_eq!(get_fee(&conn, &august.id).expect("reload").status, FeeStatus::Unpaid);

        let summary = yearly_summary(&conn, &x, 2025).expect("summary");
        assert_eq!(summary.records[5].fee_id.as_deref(), Some(early.id.as_str()));
        assert_eq!(summary.records[6].status, "not assigned");
        assert_eq!(summary.records[7].amount, Some(600.0));
    }

    #[test]
    fn delete_retracts_from_fee_history() {
        let (conn, x, _) = seeded();
        let a = create_fee(&conn, new_fee(&x, 1.0, "2025-06-10", None, None), now()).expect("a");
        let b = create_fee(&conn, new_fee(&x, 1.0, "2025-07-10", None, None), now()).expect("b");
        assert_eq!(store::student_fee_ids(&conn, &x).expect("ids"), vec![a.id.clone(), b.id.clone()]);

        delete_fee(&conn, &a.id).expect("delete");
        assert_eq!(store::student_fee_ids(&conn, &x).expect("ids"), vec![b.id]);
        assert_eq!(delete_fee(&conn, &a.id).expect_err("gone").code(), "not_found");
    }

    #[test]
    fn yearly_summary_always_has_twelve_months() {
        let (conn, x, _) = seeded();
        let empty = yearly_summary(&conn, &x, 2025).expect("empty");
        assert_eq!(empty.records.len(), 12);

        create_fee(&conn, new_fee(&x, 5000.0, "2025-06-10", None, None), now()).expect("june");
        let got = yearly_summary(&conn, &x, 2025).expect("summary");
        assert_eq!(got.student.as_deref(), Some("Student X"));
        assert_eq!(got.records.len(), 12);
        for (i, m) in got.records.iter().enumerate() {
            if i == 5 {
                assert_eq!(m.month, "June");
                assert_eq!(m.amount, Some(5000.0));
                assert_eq!(m.status, "unpaid");
            } else {
                assert_eq!(m.amount, None);
                assert_eq!(m.status, "not assigned");
            }
        }
    }

    #[test]
    fn summary_buckets_paid_fees_by_payment_month_and_year() {
        let (conn, x, _) = seeded();
        // Due in January 2026, paid early in December 2025.
        create_fee(
            &conn,
            new_fee(&x, 70.0, "2026-01-05", Some(FeeStatus::Paid), Some("2025-12-20")),
            now(),
        )
        .expect("create");

        let y2025 = yearly_summary(&conn, &x, 2025).expect("2025");
        assert_eq!(y2025.records[11].status, "paid");
        let y2026 = yearly_summary(&conn, &x, 2026).expect("2026");
        assert!(y2026.records.iter().all(|m| m.status == "not assigned"));
    }

    #[test]
    fn class_roster_denormalizes_students() {
        let (conn, x, class) = seeded();
        fixtures::student(&conn, "Student Y", "R2", &class);
        create_fee(&conn, new_fee(&x, 5.0, "2025-06-10", None, None), now()).expect("fee");

        let roster = class_roster(&conn, &class).expect("roster");
        assert_eq!(roster.total_students, 2);
        let first = &roster.records[0];
        assert_eq!(first.student.name.as_deref(), Some("Student X"));
        assert_eq!(first.student.roll_number, "R1");
        assert_eq!(first.fees.len(), 1);
        assert!(roster.records[1].fees.is_empty());
        assert_eq!(class_roster(&conn, "nope").expect_err("missing").code(), "not_found");
    }
}

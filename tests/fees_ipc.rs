mod test_support;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_support::{seed_school, spawn_with_workspace, str_at, Sidecar};

const NOW: &str = "2025-01-01";

fn create(s: &mut Sidecar, student: &str, amount: f64, due: &str, status: &str, paid_at: Option<&str>) -> Value {
    s.request(
        "fees.create",
        json!({
            "studentId": student,
            "amount": amount,
            "dueDate": due,
            "status": status,
            "paymentDate": paid_at,
            "now": NOW
        }),
    )
}

#[test]
fn one_fee_per_student_per_month() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);

    let first = create(&mut s, &school.student_id, 5000.0, "2025-06-10", "unpaid", None);
    assert_eq!(first["ok"], json!(true), "{first}");
    let second = create(&mut s, &school.student_id, 3000.0, "2025-06-20", "unpaid", None);
    assert_eq!(second.pointer("/error/code"), Some(&json!("duplicate_record")));
    assert_eq!(
        second.pointer("/error/message"),
        Some(&json!("Fee for this student already exists in this month"))
    );

    let july = create(&mut s, &school.student_id, 3000.0, "2025-07-01", "unpaid", None);
    assert_eq!(july["ok"], json!(true), "{july}");
}

#[test]
fn past_due_date_is_rejected() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);
    let past = create(&mut s, &school.student_id, 100.0, "2024-12-31", "unpaid", None);
    assert_eq!(past.pointer("/error/code"), Some(&json!("invalid_state")));
    let today = create(&mut s, &school.student_id, 100.0, NOW, "unpaid", None);
    assert_eq!(today["ok"], json!(true), "{today}");
    let negative = create(&mut s, &school.student_id, -1.0, "2025-03-01", "unpaid", None);
    assert_eq!(negative.pointer("/error/code"), Some(&json!("bad_params")));
}

#[test]
fn unpaying_a_fee_clears_payment_date() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);

    let created = create(&mut s, &school.student_id, 5000.0, "2025-06-10", "paid", Some("2025-06-09"));
    assert_eq!(created.pointer("/result/fee/status"), Some(&json!("paid")));
    assert!(created.pointer("/result/fee/paymentDate").is_some_and(|v| !v.is_null()));
    let fee_id = str_at(&created, "/result/fee/id").to_string();

    let edited = s.ok("fees.update", json!({ "feeId": fee_id, "status": "unpaid", "now": NOW }));
    assert_eq!(edited.pointer("/fee/status"), Some(&json!("unpaid")));
    assert_eq!(edited.pointer("/fee/paymentDate"), Some(&Value::Null));

    let repaid = s.ok("fees.update", json!({ "feeId": fee_id, "status": "paid", "now": "2025-06-05" }));
    assert_eq!(repaid.pointer("/fee/paymentDate"), Some(&json!("2025-06-05T00:00:00")));
}

#[test]
fn paid_fee_without_payment_date_uses_now() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);
    let created = create(&mut s, &school.student_id, 10.0, "2025-02-01", "paid", None);
    assert_eq!(
        created.pointer("/result/fee/paymentDate"),
        Some(&json!("2025-01-01T00:00:00"))
    );
}

#[test]
fn yearly_summary_has_twelve_months() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);
    let created = create(&mut s, &school.student_id, 5000.0, "2025-06-10", "unpaid", None);
    assert_eq!(created["ok"], json!(true), "{created}");

    let summary = s.ok("fees.yearlySummary", json!({ "studentId": school.student_id, "year": 2025 }));
    assert_eq!(summary["student"], json!("Student X"));
    let records = summary["records"].as_array().expect("records");
    assert_eq!(records.len(), 12);
    assert_eq!(records[5]["month"], json!("June"));
    assert_eq!(records[5]["amount"], json!(5000.0));
    assert_eq!(records[5]["status"], json!("unpaid"));
    for (i, r) in records.iter().enumerate().filter(|(i, _)| *i != 5) {
        assert_eq!(r["amount"], Value::Null, "month {i}");
        assert_eq!(r["status"], json!("not assigned"), "month {i}");
    }

    let other_year = s.ok("fees.yearlySummary", json!({ "studentId": school.student_id, "year": 2024 }));
    assert!(other_year["records"]
        .as_array()
        .expect("records")
        .iter()
        .all(|r| r["status"] == json!("not assigned")));
}

#[test]
fn class_roster_lists_fee_history_and_delete_retracts() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);
    let a = create(&mut s, &school.student_id, 100.0, "2025-02-01", "unpaid", None);
    let b = create(&mut s, &school.student_id, 200.0, "2025-03-01", "unpaid", None);
    let a_id = str_at(&a, "/result/fee/id").to_string();
    let b_id = str_at(&b, "/result/fee/id").to_string();

    let roster = s.ok("fees.classRoster", json!({ "classId": school.class_id }));
    assert_eq!(roster["totalStudents"], json!(1));
    assert_eq!(roster.pointer("/records/0/name"), Some(&json!("Student X")));
    assert_eq!(roster.pointer("/records/0/fees/0/id"), Some(&json!(a_id)));
    assert_eq!(roster.pointer("/records/0/fees/1/id"), Some(&json!(b_id)));

    s.ok("fees.delete", json!({ "feeId": a_id }));
    let student = s.ok("students.get", json!({ "studentId": school.student_id }));
    assert_eq!(student.pointer("/student/feesPaid"), Some(&json!([b_id])));
    assert_eq!(s.err("fees.delete", json!({ "feeId": a_id })), "not_found");
}

#[test]
fn early_payment_blocks_a_second_fee_in_the_payment_month() {
    let mut s = spawn_with_workspace();
    let school = seed_school(&mut s);
    let early = create(&mut s, &school.student_id, 700.0, "2025-07-05", "paid", Some("2025-06-01"));
    assert_eq!(early["ok"], json!(true), "{early}");
    let june = create(&mut s, &school.student_id, 600.0, "2025-06-10", "unpaid", None);
    assert_eq!(june.pointer("/error/code"), Some(&json!("duplicate_record")));

    let summary = s.ok("fees.yearlySummary", json!({ "studentId": school.student_id, "year": 2025 }));
    assert_eq!(summary.pointer("/records/5/amount"), Some(&json!(700.0)));
    assert_eq!(summary.pointer("/records/5/status"), Some(&json!("paid")));
}

//! Daily per-student, per-class attendance.
//!
//! A record is unique on (student, class, calendar day). Corrections go through
//! `delete` followed by a fresh `mark`; there is no upsert.

use crate::dates;
use crate::error::{map_unique, CoreError, CoreResult};
use crate::model::{Attendance, AttendanceStatus};
use crate::store::{self, EntityKind};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    pub student_id: String,
    pub class_id: String,
    pub teacher_id: String,
    pub date: String,
    pub status: AttendanceStatus,
}

const COLUMNS: &str = "id, student_id, class_id, teacher_id, date, status";

fn from_row(r: &Row<'_>) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        teacher_id: r.get(3)?,
        date: r.get(4)?,
        status: r.get(5)?,
    })
}

fn select(conn: &Connection, filter: &str, params: impl rusqlite::Params) -> CoreResult<Vec<Attendance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM attendance WHERE {filter} ORDER BY date, id"
    ))?;
    let rows = stmt
        .query_map(params, from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const DUPLICATE: &str = "Attendance already marked for this student on this date";

pub fn mark(conn: &Connection, input: MarkAttendance) -> CoreResult<Attendance> {
    let date = dates::parse_instant("date", &input.date)?;
    store::require(conn, EntityKind::Student, &input.student_id)?;
    store::require(conn, EntityKind::Class, &input.class_id)?;
    store::require(conn, EntityKind::Teacher, &input.teacher_id)?;

    let day = dates::day_key(&date);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM attendance WHERE student_id = ? AND class_id = ? AND day = ?",
            (&input.student_id, &input.class_id, &day),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(existing) = existing {
        tracing::debug!(attendance_id = %existing, day = %day, "duplicate attendance rejected");
        return Err(CoreError::duplicate(DUPLICATE));
    }

    let record = Attendance {
        id: store::new_id(),
        student_id: input.student_id,
        class_id: input.class_id,
        teacher_id: input.teacher_id,
        date,
        status: input.status,
    };
    conn.execute(
        "INSERT INTO attendance(id, student_id, class_id, teacher_id, date, day, status)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.student_id,
            &record.class_id,
            &record.teacher_id,
            record.date,
            &day,
            record.status,
        ),
    )
    .map_err(|e| map_unique(e, DUPLICATE))?;
    tracing::info!(
        attendance_id = %record.id,
        student_id = %record.student_id,
        class_id = %record.class_id,
        status = record.status.as_str(),
        "attendance marked"
    );
    Ok(record)
}

pub fn get(conn: &Connection, id: &str) -> CoreResult<Attendance> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM attendance WHERE id = ?"),
        [id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found(EntityKind::Attendance.label(), id))
}

/// Records whose calendar day falls inside the month, bounds inclusive.
pub fn by_student_and_month(
    conn: &Connection,
    student_id: &str,
    year: i32,
    month: u32,
) -> CoreResult<Vec<Attendance>> {
    let (first, last) = dates::month_day_range(year, month)?;
    store::require(conn, EntityKind::Student, student_id)?;
    select(
        conn,
        "student_id = ? AND day >= ? AND day <= ?",
        (student_id, first, last),
    )
}

pub fn by_class(conn: &Connection, class_id: &str, day: Option<NaiveDate>) -> CoreResult<Vec<Attendance>> {
    store::require(conn, EntityKind::Class, class_id)?;
    match day {
        Some(d) => select(conn, "class_id = ? AND day = ?", (class_id, dates::day_key_of(d))),
        None => select(conn, "class_id = ?", [class_id]),
    }
}

pub fn by_teacher_and_class(conn: &Connection, teacher_id: &str, class_id: &str) -> CoreResult<Vec<Attendance>> {
    store::require(conn, EntityKind::Teacher, teacher_id)?;
    store::require(conn, EntityKind::Class, class_id)?;
    select(conn, "teacher_id = ? AND class_id = ?", (teacher_id, class_id))
}

pub fn by_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<Attendance>> {
    store::require(conn, EntityKind::Student, student_id)?;
    select(conn, "student_id = ?", [student_id])
}

pub fn delete(conn: &Connection, id: &str) -> CoreResult<()> {
    store::delete_row(conn, EntityKind::Attendance, id)?;
    tracing::info!(attendance_id = id, "attendance deleted");
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub leave: u32,
    /// `present / total * 100`; `None` with no records.
    pub rate: Option<f64>,
}

impl AttendanceSummary {
    pub fn tally<'a>(records: impl IntoIterator<Item = &'a Attendance>) -> Self {
        let mut s = Self::default();
        for r in records {
            s.total += 1;
            match r.status {
                AttendanceStatus::Present => s.present += 1,
                AttendanceStatus::Absent => s.absent += 1,
                AttendanceStatus::Leave => s.leave += 1,
            }
        }
        if s.total > 0 {
            s.rate = Some(f64::from(s.present) / f64::from(s.total) * 100.0);
        }
        s
    }
}

pub fn summary(conn: &Connection, student_id: &str, class_id: Option<&str>) -> CoreResult<AttendanceSummary> {
    let records = match class_id {
        Some(class_id) => {
            store::require(conn, EntityKind::Student, student_id)?;
            store::require(conn, EntityKind::Class, class_id)?;
            select(conn, "student_id = ? AND class_id = ?", (student_id, class_id))?
        }
        None => by_student(conn, student_id)?,
    };
    Ok(AttendanceSummary::tally(&records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory;
    use crate::entities::fixtures;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct Seeded {
        conn: Connection,
        student: String,
        class: String,
        teacher: String,
    }

    fn seeded() -> Seeded {
        let conn = open_memory();
        let class = fixtures::class(&conn, "10-A");
        let student = fixtures::student(&conn, "X", "R1", &class.id);
        let teacher = fixtures::teacher(&conn, "T", &[class.id.clone()]);
        Seeded {
            conn,
            student: student.id,
            class: class.id,
            teacher: teacher.id,
        }
    }

    fn mark_on(s: &Seeded, date: &str, status: AttendanceStatus) -> CoreResult<Attendance> {
        mark(
            &s.conn,
            MarkAttendance {
                student_id: s.student.clone(),
                class_id: s.class.clone(),
                teacher_id: s.teacher.clone(),
                date: date.to_string(),
                status,
            },
        )
    }

    #[test]
    fn second_mark_same_day_is_rejected_and_first_kept() {
        let s = seeded();
        let first = mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect("first");
        let e = mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect_err("dup");
        assert_eq!(e.code(), "duplicate_record");
        let e = mark_on(&s, "2024-05-01T14:00:00", AttendanceStatus::Absent).expect_err("same day");
        assert_eq!(e.code(), "duplicate_record");
        assert_eq!(get(&s.conn, &first.id).expect("get").status, AttendanceStatus::Present);
    }

    #[test]
    fn index_backs_uniqueness_without_precheck() {
        let s = seeded();
        mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect("first");
        let e = s
            .conn
            .execute(
                "INSERT INTO attendance(id, student_id, class_id, teacher_id, date, day, status)
                 VALUES('x', ?, ?, ?, '2024-05-01 08:00:00', '2024-05-01', 'absent')",
                (&s.student, &s.class, &s.teacher),
            )
            .map_err(|e| map_unique(e, DUPLICATE))
            .expect_err("index");
        assert_eq!(e.code(), "duplicate_record");
    }

    #[rstest]
    #[case::student("student")]
    #[case::class("class")]
    #[case::teacher("teacher")]
    fn missing_reference_is_not_found(#[case] missing: &str) {
        let s = seeded();
        let mut input = MarkAttendance {
            student_id: s.student.clone(),
            class_id: s.class.clone(),
            teacher_id: s.teacher.clone(),
            date: "2024-05-01".into(),
            status: AttendanceStatus::Present,
        };
        match missing {
            "student" => input.student_id = "nope".into(),
            "class" => input.class_id = "nope".into(),
            _ => input.teacher_id = "nope".into(),
        }
        let e = mark(&s.conn, input).expect_err("missing");
        assert_eq!(e.details(), Some(serde_json::json!({ "entity": missing, "id": "nope" })));
    }

    #[test]
    fn month_query_is_inclusive_of_both_ends() {
        let s = seeded();
        mark_on(&s, "2024-04-30T23:59:59", AttendanceStatus::Present).expect("april");
        mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect("may 1");
        mark_on(&s, "2024-05-31T23:59:59.500", AttendanceStatus::Absent).expect("may 31");
        mark_on(&s, "2024-06-01", AttendanceStatus::Leave).expect("june");

        let may = by_student_and_month(&s.conn, &s.student, 2024, 5).expect("may");
        let days: Vec<String> = may.iter().map(|a| dates::day_key(&a.date)).collect();
        assert_eq!(days, vec!["2024-05-01", "2024-05-31"]);
        assert!(by_student_and_month(&s.conn, &s.student, 2024, 0).is_err());
    }

    #[test]
    fn last_instant_of_month_is_found_by_day_and_month() {
        let s = seeded();
        let late = mark_on(&s, "2024-05-31T23:59:59.9995", AttendanceStatus::Present).expect("late");

        let may = by_student_and_month(&s.conn, &s.student, 2024, 5).expect("may");
        assert_eq!(may.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec![late.id.as_str()]);
        let day = NaiveDate::from_ymd_opt(2024, 5, 31).expect("day");
        assert_eq!(by_class(&s.conn, &s.class, Some(day)).expect("day").len(), 1);
        assert!(by_student_and_month(&s.conn, &s.student, 2024, 6).expect("june").is_empty());

        let e = mark_on(&s, "2024-05-31", AttendanceStatus::Absent).expect_err("same day");
        assert_eq!(e.code(), "duplicate_record");
    }

    #[test]
    fn class_query_filters_by_calendar_day() {
        let s = seeded();
        mark_on(&s, "2024-05-01T08:30:00", AttendanceStatus::Present).expect("a");
        mark_on(&s, "2024-05-02", AttendanceStatus::Absent).expect("b");

        let all = by_class(&s.conn, &s.class, None).expect("all");
        assert_eq!(all.len(), 2);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).expect("day");
        let one = by_class(&s.conn, &s.class, Some(day)).expect("one");
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].status, AttendanceStatus::Present);
    }

    #[test]
    fn summary_counts_statuses_and_rate() {
        let s = seeded();
        assert_eq!(summary(&s.conn, &s.student, None).expect("empty").rate, None);
        mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect("1");
        mark_on(&s, "2024-05-02", AttendanceStatus::Present).expect("2");
        mark_on(&s, "2024-05-03", AttendanceStatus::Absent).expect("3");
        mark_on(&s, "2024-05-04", AttendanceStatus::Leave).expect("4");

        let got = summary(&s.conn, &s.student, Some(&s.class)).expect("summary");
        assert_eq!(
            got,
            AttendanceSummary {
                total: 4,
                present: 2,
                absent: 1,
                leave: 1,
                rate: Some(50.0),
            }
        );
    }

    #[test]
    fn delete_then_remark_is_the_correction_path() {
        let s = seeded();
        let a = mark_on(&s, "2024-05-01", AttendanceStatus::Absent).expect("mark");
        delete(&s.conn, &a.id).expect("delete");
        assert_eq!(delete(&s.conn, &a.id).expect_err("again").code(), "not_found");
        let b = mark_on(&s, "2024-05-01", AttendanceStatus::Present).expect("remark");
        assert_eq!(by_teacher_and_class(&s.conn, &s.teacher, &s.class).expect("q"), vec![b]);
    }
}

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "school.sqlite3";

/// Each side of a set-valued relationship lives in its own table, keyed on
/// the pair so inserts behave as set union. No foreign keys cross
/// collections; the relationship maintainer mirrors both sides.
const LINK_TABLES: [(&str, &str, &str); 9] = [
    ("class_students", "class_id", "student_id"),
    ("class_teachers", "class_id", "teacher_id"),
    ("class_subjects", "class_id", "subject_id"),
    ("teacher_classes", "teacher_id", "class_id"),
    ("teacher_subjects", "teacher_id", "subject_id"),
    ("subject_classes", "subject_id", "class_id"),
    ("subject_teachers", "subject_id", "teacher_id"),
    ("exam_classes", "exam_id", "class_id"),
    ("exam_subjects", "exam_id", "subject_id"),
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    apply_schema(&conn)?;
    Ok(conn)
}

pub fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            roll_number TEXT NOT NULL UNIQUE,
            class_id TEXT,
            dob TEXT NOT NULL,
            address TEXT NOT NULL,
            father_name TEXT NOT NULL,
            gender TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            dob TEXT NOT NULL,
            address TEXT NOT NULL,
            mobile_no TEXT NOT NULL,
            father_name TEXT NOT NULL,
            gender TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date TEXT NOT NULL
        )",
        [],
    )?;

    for (table, owner, member) in LINK_TABLES {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    {owner} TEXT NOT NULL,
                    {member} TEXT NOT NULL,
                    PRIMARY KEY({owner}, {member})
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_member ON {table}({member})"),
            [],
        )?;
    }

    // Ordered fee history; seq preserves append order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_fees(
            student_id TEXT NOT NULL,
            fee_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            PRIMARY KEY(student_id, fee_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_fees_fee ON student_fees(fee_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            date TEXT NOT NULL,
            day TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE(student_id, class_id, day)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_day ON attendance(student_id, day)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_day ON attendance(class_id, day)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_teacher_class ON attendance(teacher_id, class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount REAL NOT NULL,
            due_date TEXT NOT NULL,
            due_month TEXT NOT NULL,
            status TEXT NOT NULL,
            payment_date TEXT,
            UNIQUE(student_id, due_month)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            UNIQUE(student_id, exam_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_exam ON results(exam_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_class ON results(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_subjects(
            result_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            subject_id TEXT NOT NULL,
            marks_obtained REAL NOT NULL,
            total_marks REAL NOT NULL,
            PRIMARY KEY(result_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    apply_schema(&conn).expect("apply schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_memory();
        apply_schema(&conn).expect("second apply");
    }

    #[test]
    fn open_db_creates_workspace_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = dir.path().join("ws");
        let _conn = open_db(&ws).expect("open");
        assert!(ws.join(DB_FILE).is_file());
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let conn = open_memory();
        assert_eq!(settings_get_json(&conn, "k").expect("get"), None);
        settings_set_json(&conn, "k", &json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &json!({ "a": 2 })).expect("overwrite");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(json!({ "a": 2 }))
        );
    }
}

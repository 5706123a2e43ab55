//! Keyed access to the entity collections and the set-valued link tables.
//!
//! Nothing here knows which side of a relationship is authoritative; the
//! relationship maintainer decides which pairs of sets move together.

use crate::error::{CoreError, CoreResult};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Class,
    Student,
    Teacher,
    Subject,
    Exam,
    Attendance,
    Fee,
    Result,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Class => "classes",
            Self::Student => "students",
            Self::Teacher => "teachers",
            Self::Subject => "subjects",
            Self::Exam => "exams",
            Self::Attendance => "attendance",
            Self::Fee => "fees",
            Self::Result => "results",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Class => "class",
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Subject => "subject",
            Self::Exam => "exam",
            Self::Attendance => "attendance record",
            Self::Fee => "fee record",
            Self::Result => "result",
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn exists(conn: &Connection, kind: EntityKind, id: &str) -> CoreResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table());
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

/// Fails with `NotFound` naming the entity kind and id.
pub fn require(conn: &Connection, kind: EntityKind, id: &str) -> CoreResult<()> {
    if exists(conn, kind, id)? {
        Ok(())
    } else {
        tracing::debug!(entity = kind.label(), id, "lookup miss");
        Err(CoreError::not_found(kind.label(), id))
    }
}

pub fn require_all(conn: &Connection, kind: EntityKind, ids: &[String]) -> CoreResult<()> {
    for id in ids {
        require(conn, kind, id)?;
    }
    Ok(())
}

/// Hard delete by id; `NotFound` when nothing was removed.
pub fn delete_row(conn: &Connection, kind: EntityKind, id: &str) -> CoreResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    let n = conn.execute(&sql, [id])?;
    if n == 0 {
        return Err(CoreError::not_found(kind.label(), id));
    }
    Ok(())
}

/// Run `f` inside one SQLite transaction, or inline when a transaction is
/// already open on this connection. Dropping the transaction on error rolls
/// back every step taken so far.
pub fn atomically<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> CoreResult<T>,
) -> CoreResult<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let out = f(&*tx)?;
    tx.commit()?;
    Ok(out)
}

/// One side of a set-valued relationship field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    ClassStudents,
    ClassTeachers,
    ClassSubjects,
    TeacherClasses,
    TeacherSubjects,
    SubjectClasses,
    SubjectTeachers,
    ExamClasses,
    ExamSubjects,
}

impl Link {
    fn table(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::ClassStudents => ("class_students", "class_id", "student_id"),
            Self::ClassTeachers => ("class_teachers", "class_id", "teacher_id"),
            Self::ClassSubjects => ("class_subjects", "class_id", "subject_id"),
            Self::TeacherClasses => ("teacher_classes", "teacher_id", "class_id"),
            Self::TeacherSubjects => ("teacher_subjects", "teacher_id", "subject_id"),
            Self::SubjectClasses => ("subject_classes", "subject_id", "class_id"),
            Self::SubjectTeachers => ("subject_teachers", "subject_id", "teacher_id"),
            Self::ExamClasses => ("exam_classes", "exam_id", "class_id"),
            Self::ExamSubjects => ("exam_subjects", "exam_id", "subject_id"),
        }
    }

    /// Set union of a single member; returns whether the set grew.
    pub fn add(self, conn: &Connection, owner: &str, member: &str) -> CoreResult<bool> {
        let (table, o, m) = self.table();
        let n = conn.execute(
            &format!("INSERT OR IGNORE INTO {table}({o}, {m}) VALUES(?, ?)"),
            (owner, member),
        )?;
        Ok(n > 0)
    }

    pub fn remove(self, conn: &Connection, owner: &str, member: &str) -> CoreResult<bool> {
        let (table, o, m) = self.table();
        let n = conn.execute(
            &format!("DELETE FROM {table} WHERE {o} = ? AND {m} = ?"),
            (owner, member),
        )?;
        Ok(n > 0)
    }

    /// Pull `member` out of every owner's set; returns how many sets changed.
    pub fn pull_everywhere(self, conn: &Connection, member: &str) -> CoreResult<usize> {
        let (table, _, m) = self.table();
        Ok(conn.execute(&format!("DELETE FROM {table} WHERE {m} = ?"), [member])?)
    }

    /// Pull `member` from every owner's set except `keep`.
    pub fn pull_except(self, conn: &Connection, member: &str, keep: &str) -> CoreResult<usize> {
        let (table, o, m) = self.table();
        Ok(conn.execute(
            &format!("DELETE FROM {table} WHERE {m} = ? AND {o} <> ?"),
            (member, keep),
        )?)
    }

    /// Drop the owner's whole set, used when the owner itself is deleted.
    pub fn clear(self, conn: &Connection, owner: &str) -> CoreResult<usize> {
        let (table, o, _) = self.table();
        Ok(conn.execute(&format!("DELETE FROM {table} WHERE {o} = ?"), [owner])?)
    }

    pub fn members(self, conn: &Connection, owner: &str) -> CoreResult<BTreeSet<String>> {
        let (table, o, m) = self.table();
        let mut stmt = conn.prepare(&format!("SELECT {m} FROM {table} WHERE {o} = ?"))?;
        let rows = stmt
            .query_map([owner], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(rows)
    }

    /// Owners whose set contains `member`.
    pub fn owners_of(self, conn: &Connection, member: &str) -> CoreResult<BTreeSet<String>> {
        let (table, o, m) = self.table();
        let mut stmt = conn.prepare(&format!("SELECT {o} FROM {table} WHERE {m} = ?"))?;
        let rows = stmt
            .query_map([member], |r| r.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(rows)
    }

    pub fn contains(self, conn: &Connection, owner: &str, member: &str) -> CoreResult<bool> {
        let (table, o, m) = self.table();
        let hit: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {table} WHERE {o} = ? AND {m} = ?"),
                (owner, member),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

/// Ordered fee history for a student (`feesPaid`).
pub fn student_fee_ids(conn: &Connection, student_id: &str) -> CoreResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT fee_id FROM student_fees WHERE student_id = ? ORDER BY seq")?;
    let ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn push_student_fee(conn: &Connection, student_id: &str, fee_id: &str) -> CoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO student_fees(student_id, fee_id, seq)
         VALUES(?, ?, (SELECT COALESCE(MAX(seq), -1) + 1 FROM student_fees WHERE student_id = ?))",
        (student_id, fee_id, student_id),
    )?;
    Ok(())
}

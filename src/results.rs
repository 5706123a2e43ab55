//! Exam results: one per (student, exam), edited subject by subject.

use crate::db;
use crate::error::{map_unique, CoreError, CoreResult};
use crate::model::{ExamResult, SubjectMarks};
use crate::store::{self, atomically, EntityKind};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const DUPLICATE: &str = "Result already exists for this student and exam";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    pub student_id: String,
    pub exam_id: String,
    pub class_id: String,
    pub subjects: Vec<SubjectMarks>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksEdit {
    pub subject_id: String,
    pub marks_obtained: Option<f64>,
    pub total_marks: Option<f64>,
}

fn check_marks(m: &SubjectMarks) -> CoreResult<()> {
    let bad = |msg: &str| -> CoreResult<()> {
        Err(CoreError::validation(format!("{msg} (subject {})", m.subject_id)))
    };
    if !m.marks_obtained.is_finite() || m.marks_obtained < 0.0 {
        return bad("marksObtained must be a number >= 0");
    }
    if !m.total_marks.is_finite() || m.total_marks < 1.0 {
        return bad("totalMarks must be a number >= 1");
    }
    if m.marks_obtained > m.total_marks {
        return bad("marksObtained must not exceed totalMarks");
    }
    Ok(())
}

fn insert_subject_rows(conn: &Connection, result_id: &str, subjects: &[SubjectMarks]) -> CoreResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO result_subjects(result_id, position, subject_id, marks_obtained, total_marks)
         VALUES(?, ?, ?, ?, ?)",
    )?;
    for (position, m) in subjects.iter().enumerate() {
        stmt.execute((result_id, position as i64, &m.subject_id, m.marks_obtained, m.total_marks))?;
    }
    Ok(())
}

pub fn create_result(conn: &Connection, input: NewResult) -> CoreResult<ExamResult> {
    if input.subjects.is_empty() {
        return Err(CoreError::validation("subjects must not be empty"));
    }
    let mut seen = HashSet::new();
    for m in &input.subjects {
        check_marks(m)?;
        if !seen.insert(m.subject_id.as_str()) {
            return Err(CoreError::validation(format!("subject listed twice: {}", m.subject_id)));
        }
    }
    store::require(conn, EntityKind::Exam, &input.exam_id)?;
    store::require(conn, EntityKind::Student, &input.student_id)?;
    store::require(conn, EntityKind::Class, &input.class_id)?;
    for m in &input.subjects {
        store::require(conn, EntityKind::Subject, &m.subject_id)?;
    }

    let result = ExamResult {
        id: store::new_id(),
        student_id: input.student_id,
        exam_id: input.exam_id,
        class_id: input.class_id,
        subjects: input.subjects,
    };
    atomically(conn, |tx| {
        // The (student, exam) index is the only duplicate check.
        tx.execute(
            "INSERT INTO results(id, student_id, exam_id, class_id) VALUES(?, ?, ?, ?)",
            (&result.id, &result.student_id, &result.exam_id, &result.class_id),
        )
        .map_err(|e| map_unique(e, DUPLICATE))?;
        insert_subject_rows(tx, &result.id, &result.subjects)
    })
    .inspect_err(|e| {
        if matches!(e, CoreError::DuplicateRecord(_)) {
            tracing::debug!(student_id = %result.student_id, exam_id = %result.exam_id, "duplicate result rejected");
        }
    })?;
    tracing::info!(result_id = %result.id, exam_id = %result.exam_id, subjects = result.subjects.len(), "result created");
    Ok(result)
}

fn load_subjects(conn: &Connection, result_id: &str) -> CoreResult<Vec<SubjectMarks>> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, marks_obtained, total_marks FROM result_subjects
         WHERE result_id = ? ORDER BY position",
    )?;
    let rows = stmt
        .query_map([result_id], |r| {
            Ok(SubjectMarks {
                subject_id: r.get(0)?,
                marks_obtained: r.get(1)?,
                total_marks: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_result(conn: &Connection, id: &str) -> CoreResult<ExamResult> {
    let head = conn
        .query_row(
            "SELECT student_id, exam_id, class_id FROM results WHERE id = ?",
            [id],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found(EntityKind::Result.label(), id))?;
    Ok(ExamResult {
        id: id.to_string(),
        student_id: head.0,
        exam_id: head.1,
        class_id: head.2,
        subjects: load_subjects(conn, id)?,
    })
}

/// Overwrite marks of subjects already present in the result. All edits
/// apply or none do; an edit naming an absent subject fails with `NotFound`.
pub fn update_result(conn: &Connection, id: &str, edits: &[MarksEdit]) -> CoreResult<ExamResult> {
    let mut result = get_result(conn, id)?;
    for edit in edits {
        let row = result
            .subjects
            .iter_mut()
            .find(|s| s.subject_id == edit.subject_id)
            .ok_or_else(|| CoreError::not_found("subject in this result", edit.subject_id.as_str()))?;
        if let Some(v) = edit.marks_obtained {
            row.marks_obtained = v;
        }
        if let Some(v) = edit.total_marks {
            row.total_marks = v;
        }
    }
    for m in &result.subjects {
        check_marks(m)?;
    }
    atomically(conn, |tx| {
        let mut stmt = tx.prepare(
            "UPDATE result_subjects SET marks_obtained = ?, total_marks = ?
             WHERE result_id = ? AND subject_id = ?",
        )?;
        for m in &result.subjects {
            stmt.execute((m.marks_obtained, m.total_marks, id, &m.subject_id))?;
        }
        Ok(())
    })?;
    tracing::info!(result_id = id, edits = edits.len(), "result updated");
    Ok(result)
}

pub fn delete_result(conn: &Connection, id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        store::delete_row(tx, EntityKind::Result, id)?;
        tx.execute("DELETE FROM result_subjects WHERE result_id = ?", [id])?;
        tracing::info!(result_id = id, "result deleted");
        Ok(())
    })
}

fn query_ids(conn: &Connection, filter: &str, param: Option<&str>) -> CoreResult<Vec<ExamResult>> {
    let sql = format!("SELECT id FROM results {filter} ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let ids = match param {
        Some(p) => stmt.query_map([p], |r| r.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], |r| r.get::<_, String>(0))?.collect::<Result<Vec<_>, _>>()?,
    };
    ids.iter().map(|id| get_result(conn, id)).collect()
}

pub fn by_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<ExamResult>> {
    store::require(conn, EntityKind::Student, student_id)?;
    query_ids(conn, "WHERE student_id = ?", Some(student_id))
}

pub fn by_exam(conn: &Connection, exam_id: &str) -> CoreResult<Vec<ExamResult>> {
    store::require(conn, EntityKind::Exam, exam_id)?;
    query_ids(conn, "WHERE exam_id = ?", Some(exam_id))
}

pub fn by_class(conn: &Connection, class_id: &str) -> CoreResult<Vec<ExamResult>> {
    store::require(conn, EntityKind::Class, class_id)?;
    query_ids(conn, "WHERE class_id = ?", Some(class_id))
}

pub fn all(conn: &Connection) -> CoreResult<Vec<ExamResult>> {
    query_ids(conn, "", None)
}

/// Raw aggregate over a result's subject rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkTotals {
    pub obtained: f64,
    pub max: f64,
    pub percentage: Option<f64>,
}

impl MarkTotals {
    pub fn of(subjects: &[SubjectMarks]) -> Self {
        let obtained: f64 = subjects.iter().map(|s| s.marks_obtained).sum();
        let max: f64 = subjects.iter().map(|s| s.total_marks).sum();
        let percentage = (max > 0.0).then(|| obtained / max * 100.0);
        Self {
            obtained,
            max,
            percentage,
        }
    }
}

pub const GRADING_KEY: &str = "grading.policy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_percentage: f64,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingPolicy {
    pub pass_percentage: f64,
    pub bands: Vec<GradeBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub passed: bool,
    pub grade: String,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        let band = |min: f64, grade: &str| GradeBand {
            min_percentage: min,
            grade: grade.to_string(),
        };
        Self {
            pass_percentage: 50.0,
            bands: vec![
                band(90.0, "A+"),
                band(80.0, "A"),
                band(70.0, "B"),
                band(60.0, "C"),
                band(50.0, "D"),
                band(0.0, "F"),
            ],
        }
    }
}

impl GradingPolicy {
    pub fn validate(&self) -> CoreResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.pass_percentage) {
            return Err(CoreError::validation("passPercentage must be between 0 and 100"));
        }
        if self.bands.is_empty() {
            return Err(CoreError::validation("bands must not be empty"));
        }
        let mut mins = HashSet::new();
        for b in &self.bands {
            if !in_range(b.min_percentage) {
                return Err(CoreError::validation("band minPercentage must be between 0 and 100"));
            }
            if b.grade.trim().is_empty() {
                return Err(CoreError::validation("band grade must not be empty"));
            }
            if !mins.insert(b.min_percentage.to_bits()) {
                return Err(CoreError::validation("band minPercentage values must be distinct"));
            }
        }
        if !self.bands.iter().any(|b| b.min_percentage == 0.0) {
            return Err(CoreError::validation("lowest band must start at 0"));
        }
        Ok(())
    }

    /// Bands are checked highest first. `None` when there is no percentage.
    pub fn evaluate(&self, percentage: Option<f64>) -> Option<Outcome> {
        let p = percentage?;
        let mut bands: Vec<&GradeBand> = self.bands.iter().collect();
        bands.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));
        let grade = bands.iter().find(|b| p >= b.min_percentage)?;
        Some(Outcome {
            passed: p >= self.pass_percentage,
            grade: grade.grade.clone(),
        })
    }

    /// Workspace policy, or the default when none is stored or the stored
    /// value no longer parses.
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let Some(raw) = db::settings_get_json(conn, GRADING_KEY)? else {
            return Ok(Self::default());
        };
        match serde_json::from_value::<Self>(raw) {
            Ok(p) if p.validate().is_ok() => Ok(p),
            _ => {
                tracing::warn!(key = GRADING_KEY, "stored grading policy is invalid; using default");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, GRADING_KEY, &serde_json::to_value(self)?)
    }
}

//! Named read views.
//!
//! Each view denormalizes the names a caller needs for display. Lookups go
//! through a per-view [`Resolver`] so repeated ids are read once; an id that
//! no longer resolves is logged and rendered as `null`.

use crate::entities;
use crate::error::CoreResult;
use crate::model::{Attendance, AttendanceStatus, Class, Exam, ExamResult, Role, Student, Subject, Teacher};
use crate::results::{GradingPolicy, MarkTotals, Outcome};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub student_id: String,
    pub name: Option<String>,
    pub roll_number: String,
}

impl StudentRef {
    pub fn bare(id: &str, roll_number: &str) -> Self {
        Self {
            student_id: id.to_string(),
            name: None,
            roll_number: roll_number.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRef {
    pub id: String,
    pub name: String,
    pub date: NaiveDateTime,
}

fn cached<T: Clone>(
    cache: &mut HashMap<String, Option<T>>,
    kind: &'static str,
    id: &str,
    load: impl FnOnce() -> CoreResult<Option<T>>,
) -> CoreResult<Option<T>> {
    if let Some(hit) = cache.get(id) {
        return Ok(hit.clone());
    }
    let value = load()?;
    if value.is_none() {
        tracing::warn!(entity = kind, id, "dangling reference in view");
    }
    cache.insert(id.to_string(), value.clone());
    Ok(value)
}

pub struct Resolver<'c> {
    conn: &'c Connection,
    students: HashMap<String, Option<StudentRef>>,
    classes: HashMap<String, Option<NamedRef>>,
    teachers: HashMap<String, Option<NamedRef>>,
    subjects: HashMap<String, Option<NamedRef>>,
    exams: HashMap<String, Option<ExamRef>>,
}

impl<'c> Resolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            students: HashMap::new(),
            classes: HashMap::new(),
            teachers: HashMap::new(),
            subjects: HashMap::new(),
            exams: HashMap::new(),
        }
    }

    pub fn student(&mut self, id: &str) -> CoreResult<Option<StudentRef>> {
        let conn = self.conn;
        cached(&mut self.students, "student", id, || {
            Ok(conn
                .query_row(
                    "SELECT s.id, u.name, s.roll_number
                     FROM students s LEFT JOIN users u ON u.id = s.user_id
                     WHERE s.id = ?",
                    [id],
                    |r| {
                        Ok(StudentRef {
                            student_id: r.get(0)?,
                            name: r.get(1)?,
                            roll_number: r.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    fn named(
        conn: &Connection,
        cache: &mut HashMap<String, Option<NamedRef>>,
        kind: &'static str,
        sql: &str,
        id: &str,
    ) -> CoreResult<Option<NamedRef>> {
        cached(cache, kind, id, || {
            Ok(conn
                .query_row(sql, [id], |r| {
                    Ok(NamedRef {
                        id: id.to_string(),
                        name: r.get(0)?,
                    })
                })
                .optional()?)
        })
    }

    pub fn class(&mut self, id: &str) -> CoreResult<Option<NamedRef>> {
        Self::named(self.conn, &mut self.classes, "class", "SELECT name FROM classes WHERE id = ?", id)
    }

    pub fn teacher(&mut self, id: &str) -> CoreResult<Option<NamedRef>> {
        Self::named(
            self.conn,
            &mut self.teachers,
            "teacher",
            "SELECT COALESCE(u.name, '') FROM teachers t LEFT JOIN users u ON u.id = t.user_id WHERE t.id = ?",
            id,
        )
    }

    pub fn subject(&mut self, id: &str) -> CoreResult<Option<NamedRef>> {
        Self::named(self.conn, &mut self.subjects, "subject", "SELECT name FROM subjects WHERE id = ?", id)
    }

    pub fn exam(&mut self, id: &str) -> CoreResult<Option<ExamRef>> {
        let conn = self.conn;
        cached(&mut self.exams, "exam", id, || {
            Ok(conn
                .query_row("SELECT name, date FROM exams WHERE id = ?", [id], |r| {
                    Ok(ExamRef {
                        id: id.to_string(),
                        name: r.get(0)?,
                        date: r.get(1)?,
                    })
                })
                .optional()?)
        })
    }

    fn students_of(&mut self, ids: &BTreeSet<String>) -> CoreResult<Vec<StudentRef>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.extend(self.student(id)?);
        }
        out.sort_by(|a, b| a.roll_number.cmp(&b.roll_number));
        Ok(out)
    }

    fn refs(
        &mut self,
        ids: &BTreeSet<String>,
        mut one: impl FnMut(&mut Self, &str) -> CoreResult<Option<NamedRef>>,
    ) -> CoreResult<Vec<NamedRef>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.extend(one(self, id)?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Classes

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTotals {
    pub records: i64,
    pub assigned: f64,
    pub paid: f64,
    pub outstanding: f64,
}

fn class_fee_totals(conn: &Connection, class_id: &str) -> CoreResult<FeeTotals> {
    Ok(conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(amount), 0),
                COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0 END), 0)
         FROM fees WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)",
        [class_id],
        |r| {
            let assigned: f64 = r.get(1)?;
            let paid: f64 = r.get(2)?;
            Ok(FeeTotals {
                records: r.get(0)?,
                assigned,
                paid,
                outstanding: assigned - paid,
            })
        },
    )?)
}

/// "All classes with their students' names and fee totals."
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverview {
    pub id: String,
    pub name: String,
    pub students: Vec<StudentRef>,
    pub teacher_count: usize,
    pub subject_count: usize,
    pub fees: FeeTotals,
}

pub fn class_overview(conn: &Connection) -> CoreResult<Vec<ClassOverview>> {
    let mut resolver = Resolver::new(conn);
    let mut out = Vec::new();
    for class in entities::list_classes(conn)? {
        out.push(ClassOverview {
            students: resolver.students_of(&class.students)?,
            teacher_count: class.teachers.len(),
            subject_count: class.subjects.len(),
            fees: class_fee_totals(conn, &class.id)?,
            id: class.id,
            name: class.name,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    pub id: String,
    pub name: String,
    pub students: Vec<StudentRef>,
    pub teachers: Vec<NamedRef>,
    pub subjects: Vec<NamedRef>,
}

fn detail_of(resolver: &mut Resolver<'_>, class: Class) -> CoreResult<ClassDetail> {
    Ok(ClassDetail {
        students: resolver.students_of(&class.students)?,
        teachers: resolver.refs(&class.teachers, |r, id| r.teacher(id))?,
        subjects: resolver.refs(&class.subjects, |r, id| r.subject(id))?,
        id: class.id,
        name: class.name,
    })
}

pub fn class_detail(conn: &Connection, class_id: &str) -> CoreResult<ClassDetail> {
    let class = entities::get_class(conn, class_id)?;
    detail_of(&mut Resolver::new(conn), class)
}

pub fn classes_for_member(conn: &Connection, role: Role, member_id: &str) -> CoreResult<Vec<ClassDetail>> {
    let mut resolver = Resolver::new(conn);
    entities::classes_for_member(conn, role, member_id)?
        .into_iter()
        .map(|c| detail_of(&mut resolver, c))
        .collect()
}

// ---------------------------------------------------------------------------
// Profiles

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    #[serde(flatten)]
    pub student: Student,
    pub name: Option<String>,
    pub email: Option<String>,
    pub class_name: Option<String>,
}

fn user_contact(conn: &Connection, user_id: &str) -> CoreResult<(Option<String>, Option<String>)> {
    let hit = conn
        .query_row("SELECT name, email FROM users WHERE id = ?", [user_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .optional()?;
    if hit.is_none() {
        tracing::warn!(entity = "user", id = user_id, "dangling reference in view");
    }
    Ok(hit.map_or((None, None), |(n, e)| (Some(n), Some(e))))
}

pub fn student_profiles(conn: &Connection, students: Vec<Student>) -> CoreResult<Vec<StudentProfile>> {
    let mut resolver = Resolver::new(conn);
    students
        .into_iter()
        .map(|student| {
            let (name, email) = user_contact(conn, &student.user_id)?;
            let class_name = match &student.class_id {
                Some(c) => resolver.class(c)?.map(|r| r.name),
                None => None,
            };
            Ok(StudentProfile {
                student,
                name,
                email,
                class_name,
            })
        })
        .collect()
}

/// Output of `students.byClass`: the class, its teachers and full student profiles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStudents {
    pub class: NamedRef,
    pub teachers: Vec<NamedRef>,
    pub students: Vec<StudentProfile>,
}

pub fn class_students(conn: &Connection, class_id: &str) -> CoreResult<ClassStudents> {
    let class = entities::get_class(conn, class_id)?;
    let mut resolver = Resolver::new(conn);
    let teachers = resolver.refs(&class.teachers, |r, id| r.teacher(id))?;
    let students = student_profiles(conn, entities::students_in_class(conn, class_id)?)?;
    Ok(ClassStudents {
        class: NamedRef {
            id: class.id,
            name: class.name,
        },
        teachers,
        students,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    #[serde(flatten)]
    pub teacher: Teacher,
    pub name: Option<String>,
    pub email: Option<String>,
    pub class_names: Vec<String>,
    pub subject_names: Vec<String>,
}

pub fn teacher_profiles(conn: &Connection, teachers: Vec<Teacher>) -> CoreResult<Vec<TeacherProfile>> {
    let mut resolver = Resolver::new(conn);
    teachers
        .into_iter()
        .map(|teacher| {
            let (name, email) = user_contact(conn, &teacher.user_id)?;
            let class_names = resolver
                .refs(&teacher.classes, |r, id| r.class(id))?
                .into_iter()
                .map(|c| c.name)
                .collect();
            let subject_names = resolver
                .refs(&teacher.subjects, |r, id| r.subject(id))?
                .into_iter()
                .map(|s| s.name)
                .collect();
            Ok(TeacherProfile {
                teacher,
                name,
                email,
                class_names,
                subject_names,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOverview {
    pub id: String,
    pub name: String,
    pub classes: Vec<NamedRef>,
    pub teachers: Vec<NamedRef>,
}

pub fn subject_overview(conn: &Connection, subjects: Vec<Subject>) -> CoreResult<Vec<SubjectOverview>> {
    let mut resolver = Resolver::new(conn);
    subjects
        .into_iter()
        .map(|s| {
            Ok(SubjectOverview {
                classes: resolver.refs(&s.classes, |r, id| r.class(id))?,
                teachers: resolver.refs(&s.teachers, |r, id| r.teacher(id))?,
                id: s.id,
                name: s.name,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamOverview {
    pub id: String,
    pub name: String,
    pub date: NaiveDateTime,
    pub classes: Vec<NamedRef>,
    pub subjects: Vec<NamedRef>,
}

pub fn exam_overview(conn: &Connection, exams: Vec<Exam>) -> CoreResult<Vec<ExamOverview>> {
    let mut resolver = Resolver::new(conn);
    exams
        .into_iter()
        .map(|e| {
            Ok(ExamOverview {
                classes: resolver.refs(&e.classes, |r, id| r.class(id))?,
                subjects: resolver.refs(&e.subjects, |r, id| r.subject(id))?,
                id: e.id,
                name: e.name,
                date: e.date,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Records

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: String,
    pub date: NaiveDateTime,
    pub status: AttendanceStatus,
    pub student_id: String,
    pub class_id: String,
    pub teacher_id: String,
    pub student: Option<StudentRef>,
    pub class: Option<NamedRef>,
    pub teacher: Option<NamedRef>,
}

pub fn attendance_views(conn: &Connection, records: Vec<Attendance>) -> CoreResult<Vec<AttendanceView>> {
    let mut resolver = Resolver::new(conn);
    records
        .into_iter()
        .map(|a| {
            Ok(AttendanceView {
                student: resolver.student(&a.student_id)?,
                class: resolver.class(&a.class_id)?,
                teacher: resolver.teacher(&a.teacher_id)?,
                id: a.id,
                date: a.date,
                status: a.status,
                student_id: a.student_id,
                class_id: a.class_id,
                teacher_id: a.teacher_id,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMarksView {
    pub subject_id: String,
    pub subject_name: Option<String>,
    pub marks_obtained: f64,
    pub total_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub class_id: String,
    pub student: Option<StudentRef>,
    pub exam: Option<ExamRef>,
    pub class: Option<NamedRef>,
    pub subjects: Vec<SubjectMarksView>,
    pub totals: MarkTotals,
    pub outcome: Option<Outcome>,
}

pub fn result_views(
    conn: &Connection,
    results: Vec<ExamResult>,
    policy: &GradingPolicy,
) -> CoreResult<Vec<ResultView>> {
    let mut resolver = Resolver::new(conn);
    results
        .into_iter()
        .map(|r| {
            let totals = MarkTotals::of(&r.subjects);
            let mut subjects = Vec::with_capacity(r.subjects.len());
            for m in r.subjects {
                subjects.push(SubjectMarksView {
                    subject_name: resolver.subject(&m.subject_id)?.map(|s| s.name),
                    subject_id: m.subject_id,
                    marks_obtained: m.marks_obtained,
                    total_marks: m.total_marks,
                });
            }
            Ok(ResultView {
                student: resolver.student(&r.student_id)?,
                exam: resolver.exam(&r.exam_id)?,
                class: resolver.class(&r.class_id)?,
                outcome: policy.evaluate(totals.percentage),
                totals,
                subjects,
                id: r.id,
                student_id: r.student_id,
                exam_id: r.exam_id,
                class_id: r.class_id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{self, MarkAttendance};
    use crate::db::open_memory;
    use crate::entities::fixtures;
    use crate::fees::{self, NewFee};
    use crate::model::{FeeStatus, SubjectMarks};
    use crate::results::{self, NewResult};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn class_overview_carries_names_and_fee_totals() {
        let conn = open_memory();
        let c = fixtures::class(&conn, "10-A");
        let x = fixtures::student(&conn, "Xavier", "R2", &c.id);
        let y = fixtures::student(&conn, "Yara", "R1", &c.id);
        let now = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("now");
        for (student, due, status) in [
            (&x.id, "2025-02-01", FeeStatus::Paid),
            (&y.id, "2025-02-01", FeeStatus::Unpaid),
        ] {
            fees::create_fee(
                &conn,
                NewFee {
                    student_id: student.clone(),
                    amount: 100.0,
                    due_date: due.into(),
                    status: Some(status),
                    payment_date: None,
                },
                now,
            )
            .expect("fee");
        }

        let overview = class_overview(&conn).expect("overview");
        assert_eq!(overview.len(), 1);
        let names: Vec<_> = overview[0].students.iter().filter_map(|s| s.name.as_deref()).collect();
        assert_eq!(names, vec!["Yara", "Xavier"]);
        assert_eq!(
            overview[0].fees,
            FeeTotals {
                records: 2,
                assigned: 200.0,
                paid: 100.0,
                outstanding: 100.0,
            }
        );
    }

    #[test]
    fn class_detail_resolves_teacher_names() {
        let conn = open_memory();
        let c = fixtures::class(&conn, "C");
        fixtures::teacher(&conn, "Ms Smith", &[c.id.clone()]);
        let detail = class_detail(&conn, &c.id).expect("detail");
        assert_eq!(detail.teachers.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Ms Smith"]);
    }

    #[test]
    fn dangling_ids_render_as_null() {
        let conn = open_memory();
        let c = fixtures::class(&conn, "C");
        let x = fixtures::student(&conn, "X", "R1", &c.id);
        let t = fixtures::teacher(&conn, "T", &[c.id.clone()]);
        let a = attendance::mark(
            &conn,
            MarkAttendance {
                student_id: x.id.clone(),
                class_id: c.id.clone(),
                teacher_id: t.id.clone(),
                date: "2024-05-01".into(),
                status: AttendanceStatus::Present,
            },
        )
        .expect("mark");
        conn.execute("DELETE FROM teachers WHERE id = ?", [&t.id]).expect("raw delete");

        let views = attendance_views(&conn, vec![a]).expect("views");
        assert_eq!(views[0].teacher, None);
        assert_eq!(views[0].class.as_ref().map(|c| c.name.as_str()), Some("C"));
        assert_eq!(views[0].student.as_ref().map(|s| s.roll_number.as_str()), Some("R1"));
    }

    #[test]
    fn result_view_adds_totals_and_outcome() {
        let conn = open_memory();
        let c = fixtures::class(&conn, "C");
        let x = fixtures::student(&conn, "X", "R1", &c.id);
        let math = fixtures::subject(&conn, "math");
        let exam = fixtures::exam(&conn, "Final", &c.id, &[math.id.clone()]);
        let r = results::create_result(
            &conn,
            NewResult {
                student_id: x.id,
                exam_id: exam.id,
                class_id: c.id,
                subjects: vec![SubjectMarks {
                    subject_id: math.id,
                    marks_obtained: 45.0,
                    total_marks: 50.0,
                }],
            },
        )
        .expect("result");

        let views = result_views(&conn, vec![r], &GradingPolicy::default()).expect("views");
        let v = &views[0];
        assert_eq!(v.subjects[0].subject_name.as_deref(), Some("MATH"));
        assert_eq!(v.exam.as_ref().map(|e| e.name.as_str()), Some("Final"));
        assert_eq!(v.totals.percentage, Some(90.0));
        assert_eq!(v.outcome.as_ref().map(|o| o.grade.as_str()), Some("A+"));
    }

    #[test]
    fn student_profiles_serialize_flat() {
        let conn = open_memory();
        let c = fixtures::class(&conn, "C");
        let x = fixtures::student(&conn, "Ann Lee", "R1", &c.id);
        let profiles = student_profiles(&conn, vec![x]).expect("profiles");
        let v = serde_json::to_value(&profiles[0]).expect("json");
        assert_eq!(v["name"], "Ann Lee");
        assert_eq!(v["rollNumber"], "R1");
        assert_eq!(v["className"], "C");
        assert_eq!(v["email"], "ann.lee@school.test");
    }
}

//! Relationship maintainer.
//!
//! Class owns the authoritative membership sets; Student.classId and the
//! Teacher/Subject/Exam back-reference sets are derived. Every edit here
//! touches the owning side and its mirrors inside one `atomically` block.

use crate::error::CoreResult;
use crate::store::{self, atomically, EntityKind, Link};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

fn current_class_of(conn: &Connection, student_id: &str) -> CoreResult<Option<String>> {
    let v: Option<Option<String>> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.flatten())
}

/// Move a student into `class_id`, removing them from every other class.
///
/// Returns `false` when the student was already a consistent member of the
/// target class and nothing changed.
pub fn assign_student_to_class(conn: &Connection, student_id: &str, class_id: &str) -> CoreResult<bool> {
    store::require(conn, EntityKind::Student, student_id)?;
    store::require(conn, EntityKind::Class, class_id)?;

    atomically(conn, |tx| {
        let already = current_class_of(tx, student_id)?.as_deref() == Some(class_id)
            && Link::ClassStudents.contains(tx, class_id, student_id)?
            && Link::ClassStudents.owners_of(tx, student_id)?.len() == 1;
        if already {
            return Ok(false);
        }

        let pulled = Link::ClassStudents.pull_except(tx, student_id, class_id)?;
        tx.execute(
            "UPDATE students SET class_id = ? WHERE id = ?",
            (class_id, student_id),
        )?;
        Link::ClassStudents.add(tx, class_id, student_id)?;
        tracing::info!(student_id, class_id, pulled, "student assigned to class");
        Ok(true)
    })
}

/// Union `teacher_id` into each class's teachers and each class into the
/// teacher's classes. Repeating the call leaves the same state.
pub fn attach_teacher_to_classes(conn: &Connection, teacher_id: &str, class_ids: &[String]) -> CoreResult<()> {
    store::require(conn, EntityKind::Teacher, teacher_id)?;
    store::require_all(conn, EntityKind::Class, class_ids)?;

    atomically(conn, |tx| {
        for class_id in class_ids {
            Link::ClassTeachers.add(tx, class_id, teacher_id)?;
            Link::TeacherClasses.add(tx, teacher_id, class_id)?;
        }
        tracing::info!(teacher_id, classes = class_ids.len(), "teacher attached to classes");
        Ok(())
    })
}

/// Link subjects to a class; with `teacher_ids`, also cross-link every
/// teacher with every subject and with the class.
pub fn assign_subjects_to_class(
    conn: &Connection,
    class_id: &str,
    subject_ids: &[String],
    teacher_ids: Option<&[String]>,
) -> CoreResult<()> {
    store::require(conn, EntityKind::Class, class_id)?;
    store::require_all(conn, EntityKind::Subject, subject_ids)?;
    if let Some(teachers) = teacher_ids {
        store::require_all(conn, EntityKind::Teacher, teachers)?;
    }

    atomically(conn, |tx| {
        for subject_id in subject_ids {
            Link::ClassSubjects.add(tx, class_id, subject_id)?;
            Link::SubjectClasses.add(tx, subject_id, class_id)?;
        }
        for teacher_id in teacher_ids.unwrap_or_default() {
            for subject_id in subject_ids {
                Link::TeacherSubjects.add(tx, teacher_id, subject_id)?;
                Link::SubjectTeachers.add(tx, subject_id, teacher_id)?;
            }
            Link::TeacherClasses.add(tx, teacher_id, class_id)?;
            Link::ClassTeachers.add(tx, class_id, teacher_id)?;
        }
        tracing::info!(
            class_id,
            subjects = subject_ids.len(),
            teachers = teacher_ids.map(|t| t.len()).unwrap_or(0),
            "subjects assigned to class"
        );
        Ok(())
    })
}

/// Make `owner`'s set on `forward` equal `desired`, keeping the mirrored
/// set on `backward` in step for every member added or removed.
pub fn replace_set(
    conn: &Connection,
    forward: Link,
    backward: Link,
    owner: &str,
    desired: &BTreeSet<String>,
) -> CoreResult<()> {
    atomically(conn, |tx| {
        let current = forward.members(tx, owner)?;
        for gone in current.difference(desired) {
            forward.remove(tx, owner, gone)?;
            backward.remove(tx, gone, owner)?;
        }
        for added in desired.difference(&current) {
            forward.add(tx, owner, added)?;
            backward.add(tx, added, owner)?;
        }
        Ok(())
    })
}

/// Cleanup before a subject is deleted.
pub fn detach_subject(conn: &Connection, subject_id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        let teachers = Link::TeacherSubjects.pull_everywhere(tx, subject_id)?;
        let classes = Link::ClassSubjects.pull_everywhere(tx, subject_id)?;
        let exams = Link::ExamSubjects.pull_everywhere(tx, subject_id)?;
        Link::SubjectClasses.clear(tx, subject_id)?;
        Link::SubjectTeachers.clear(tx, subject_id)?;
        tracing::info!(subject_id, teachers, classes, exams, "subject detached");
        Ok(())
    })
}

pub fn detach_teacher(conn: &Connection, teacher_id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        let classes = Link::ClassTeachers.pull_everywhere(tx, teacher_id)?;
        let subjects = Link::SubjectTeachers.pull_everywhere(tx, teacher_id)?;
        Link::TeacherClasses.clear(tx, teacher_id)?;
        Link::TeacherSubjects.clear(tx, teacher_id)?;
        tracing::info!(teacher_id, classes, subjects, "teacher detached");
        Ok(())
    })
}

pub fn detach_student(conn: &Connection, student_id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        let classes = Link::ClassStudents.pull_everywhere(tx, student_id)?;
        tracing::info!(student_id, classes, "student detached");
        Ok(())
    })
}

/// Cleanup before a class is deleted. Members survive; their students are
/// left unassigned.
pub fn detach_class(conn: &Connection, class_id: &str) -> CoreResult<()> {
    atomically(conn, |tx| {
        let teachers = Link::TeacherClasses.pull_everywhere(tx, class_id)?;
        let subjects = Link::SubjectClasses.pull_everywhere(tx, class_id)?;
        let exams = Link::ExamClasses.pull_everywhere(tx, class_id)?;
        let students = tx.execute(
            "UPDATE students SET class_id = NULL WHERE class_id = ?",
            [class_id],
        )?;
        Link::ClassStudents.clear(tx, class_id)?;
        Link::ClassTeachers.clear(tx, class_id)?;
        Link::ClassSubjects.clear(tx, class_id)?;
        tracing::info!(class_id, teachers, subjects, exams, students, "class detached");
        Ok(())
    })
}

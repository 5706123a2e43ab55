use crate::dates;
use crate::error::{map_unique, CoreError, CoreResult};
use crate::model::{Class, Exam, Gender, Role, Student, Subject, Teacher, User};
use crate::relations;
use crate::store::{self, atomically, EntityKind, Link};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use std::collections::BTreeSet;

fn required(field: &str, value: &str) -> CoreResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(CoreError::validation(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

fn optional_required(field: &str, value: Option<&str>) -> CoreResult<Option<String>> {
    value.map(|v| required(field, v)).transpose()
}

fn id_set(ids: &[String]) -> BTreeSet<String> {
    ids.iter().cloned().collect()
}

// ---------------------------------------------------------------------------
// Users

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        password_hash: r.get(3)?,
        role: r.get(4)?,
    })
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role";

pub fn register_user(conn: &Connection, input: NewUser) -> CoreResult<User> {
    let name = required("name", &input.name)?;
    let email = required("email", &input.email)?;
    let password_hash = required("passwordHash", &input.password_hash)?;

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(CoreError::duplicate("User already exists"));
    }

    let user = User {
        id: store::new_id(),
        name,
        email,
        password_hash,
        role: input.role,
    };
    conn.execute(
        "INSERT INTO users(id, name, email, password_hash, role) VALUES(?, ?, ?, ?, ?)",
        (&user.id, &user.name, &user.email, &user.password_hash, user.role),
    )
    .map_err(|e| map_unique(e, "User already exists"))?;
    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user registered");
    Ok(user)
}

pub fn get_user(conn: &Connection, id: &str) -> CoreResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("user", id))
}

pub fn list_users(conn: &Connection) -> CoreResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name, id"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

fn profile_id(conn: &Connection, table: &str, user_id: &str) -> CoreResult<Option<String>> {
    Ok(conn
        .query_row(
            &format!("SELECT id FROM {table} WHERE user_id = ?"),
            [user_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Delete a user along with the Student or Teacher profile attached to it.
pub fn delete_user(conn: &Connection, id: &str) -> CoreResult<()> {
    let user = get_user(conn, id)?;
    atomically(conn, |tx| {
        match user.role {
            Role::Student => {
                if let Some(sid) = profile_id(tx, "students", id)? {
                    delete_student(tx, &sid)?;
                }
            }
            Role::Teacher => {
                if let Some(tid) = profile_id(tx, "teachers", id)? {
                    delete_teacher(tx, &tid)?;
                }
            }
            Role::Admin => {}
        }
        store::delete_row(tx, EntityKind::User, id)?;
        tracing::info!(user_id = id, "user deleted");
        Ok(())
    })
}

fn require_role(conn: &Connection, user_id: &str, role: Role) -> CoreResult<()> {
    let user = get_user(conn, user_id)?;
    if user.role != role {
        return Err(CoreError::invalid_state(format!(
            "user {} has role {}, expected {}",
            user_id,
            user.role.as_str(),
            role.as_str()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Classes

pub fn get_class(conn: &Connection, id: &str) -> CoreResult<Class> {
    let name: String = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| CoreError::not_found("class", id))?;
    Ok(Class {
        id: id.to_string(),
        name,
        students: Link::ClassStudents.members(conn, id)?,
        teachers: Link::ClassTeachers.members(conn, id)?,
        subjects: Link::ClassSubjects.members(conn, id)?,
    })
}

pub fn list_class_ids(conn: &Connection) -> CoreResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM classes ORDER BY name")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn list_classes(conn: &Connection) -> CoreResult<Vec<Class>> {
    list_class_ids(conn)?
        .iter()
        .map(|id| get_class(conn, id))
        .collect()
}

fn class_name_taken(conn: &Connection, name: &str, except: Option<&str>) -> CoreResult<bool> {
    let hit: Option<String> = conn
        .query_row("SELECT id FROM classes WHERE name = ?", [name], |r| r.get(0))
        .optional()?;
    Ok(matches!(hit, Some(found) if Some(found.as_str()) != except))
}

pub fn create_class(conn: &Connection, name: &str) -> CoreResult<Class> {
    let name = required("name", name)?;
    if class_name_taken(conn, &name, None)? {
        return Err(CoreError::duplicate("Class with this name already exists"));
    }
    let id = store::new_id();
    conn.execute("INSERT INTO classes(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(|e| map_unique(e, "Class with this name already exists"))?;
    tracing::info!(class_id = %id, name = %name, "class created");
    get_class(conn, &id)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPatch {
    pub name: Option<String>,
    pub students: Option<Vec<String>>,
    pub teachers: Option<Vec<String>>,
    pub subjects: Option<Vec<String>>,
}

/// Rename and re-shape a class.
///
/// `students` are moved in (a student can only leave a class by joining
/// another one); `teachers` and `subjects` replace the class's sets and the
/// removed members lose their back-reference.
pub fn update_class(conn: &Connection, id: &str, patch: ClassPatch) -> CoreResult<Class> {
    store::require(conn, EntityKind::Class, id)?;
    let name = optional_required("name", patch.name.as_deref())?;
    if let Some(students) = &patch.students {
        store::require_all(conn, EntityKind::Student, students)?;
    }
    if let Some(teachers) = &patch.teachers {
        store::require_all(conn, EntityKind::Teacher, teachers)?;
    }
    if let Some(subjects) = &patch.subjects {
        store::require_all(conn, EntityKind::Subject, subjects)?;
    }

    atomically(conn, |tx| {
        if let Some(name) = &name {
            if class_name_taken(tx, name, Some(id))? {
                return Err(CoreError::duplicate("Class with this name already exists"));
            }
            tx.execute("UPDATE classes SET name = ? WHERE id = ?", (name, id))
                .map_err(|e| map_unique(e, "Class with this name already exists"))?;
        }
        for student_id in patch.students.iter().flatten() {
            relations::assign_student_to_class(tx, student_id, id)?;
        }
        if let Some(teachers) = &patch.teachers {
            relations::replace_set(tx, Link::ClassTeachers, Link::TeacherClasses, id, &id_set(teachers))?;
        }
        if let Some(subjects) = &patch.subjects {
            relations::replace_set(tx, Link::ClassSubjects, Link::SubjectClasses, id, &id_set(subjects))?;
            if let Some(teachers) = &patch.teachers {
                relations::assign_subjects_to_class(tx, id, subjects, Some(teachers.as_slice()))?;
            }
        }
        tracing::info!(class_id = id, "class updated");
        Ok(())
    })?;
    get_class(conn, id)
}

pub fn delete_class(conn: &Connection, id: &str) -> CoreResult<()> {
    store::require(conn, EntityKind::Class, id)?;
    atomically(conn, |tx| {
        relations::detach_class(tx, id)?;
        store::delete_row(tx, EntityKind::Class, id)?;
        tracing::info!(class_id = id, "class deleted");
        Ok(())
    })
}

/// Classes a student or teacher currently belongs to, read from the owning side.
pub fn classes_for_member(conn: &Connection, role: Role, member_id: &str) -> CoreResult<Vec<Class>> {
    let ids = match role {
        Role::Student => Link::ClassStudents.owners_of(conn, member_id)?,
        Role::Teacher => Link::ClassTeachers.owners_of(conn, member_id)?,
        Role::Admin => {
            return Err(CoreError::validation("role must be student or teacher"));
        }
    };
    ids.iter().map(|id| get_class(conn, id)).collect()
}

// ---------------------------------------------------------------------------
// Students

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub user_id: String,
    pub roll_number: String,
    pub class_id: String,
    pub dob: String,
    pub address: String,
    pub father_name: String,
    pub gender: Gender,
}

const STUDENT_COLUMNS: &str = "id, user_id, roll_number, class_id, dob, address, father_name, gender";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        user_id: r.get(1)?,
        roll_number: r.get(2)?,
        class_id: r.get(3)?,
        dob: r.get(4)?,
        address: r.get(5)?,
        father_name: r.get(6)?,
        gender: r.get(7)?,
        fees_paid: Vec::new(),
    })
}

pub fn get_student(conn: &Connection, id: &str) -> CoreResult<Student> {
    let mut student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
            [id],
            student_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("student", id))?;
    student.fees_paid = store::student_fee_ids(conn, id)?;
    Ok(student)
}

fn query_students(conn: &Connection, filter: &str, params: &[&str]) -> CoreResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students {filter} ORDER BY roll_number"
    ))?;
    let mut students = stmt
        .query_map(rusqlite::params_from_iter(params), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for s in &mut students {
        s.fees_paid = store::student_fee_ids(conn, &s.id)?;
    }
    Ok(students)
}

pub fn list_students(conn: &Connection) -> CoreResult<Vec<Student>> {
    query_students(conn, "", &[])
}

pub fn students_in_class(conn: &Connection, class_id: &str) -> CoreResult<Vec<Student>> {
    query_students(conn, "WHERE class_id = ?", &[class_id])
}

fn roll_number_taken(conn: &Connection, roll: &str, except: Option<&str>) -> CoreResult<bool> {
    let hit: Option<String> = conn
        .query_row("SELECT id FROM students WHERE roll_number = ?", [roll], |r| r.get(0))
        .optional()?;
    Ok(matches!(hit, Some(found) if Some(found.as_str()) != except))
}

pub fn create_student(conn: &Connection, input: NewStudent) -> CoreResult<Student> {
    let roll_number = required("rollNumber", &input.roll_number)?;
    let address = required("address", &input.address)?;
    let father_name = required("fatherName", &input.father_name)?;
    let dob = dates::parse_day("dob", &input.dob)?;

    if profile_id(conn, "students", &input.user_id)?.is_some() {
        return Err(CoreError::duplicate("Student profile already exists for this user"));
    }
    if roll_number_taken(conn, &roll_number, None)? {
        return Err(CoreError::duplicate("Roll number already exists"));
    }
    require_role(conn, &input.user_id, Role::Student)?;
    store::require(conn, EntityKind::Class, &input.class_id)?;

    let id = store::new_id();
    atomically(conn, |tx| {
        tx.execute(
            "INSERT INTO students(id, user_id, roll_number, class_id, dob, address, father_name, gender)
             VALUES(?, ?, ?, NULL, ?, ?, ?, ?)",
            (&id, &input.user_id, &roll_number, dob, &address, &father_name, input.gender),
        )
        .map_err(|e| map_unique(e, "Student profile or roll number already exists"))?;
        relations::assign_student_to_class(tx, &id, &input.class_id)?;
        Ok(())
    })?;
    tracing::info!(student_id = %id, class_id = %input.class_id, "student created");
    get_student(conn, &id)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub roll_number: Option<String>,
    pub dob: Option<String>,
    pub address: Option<String>,
    pub father_name: Option<String>,
    pub gender: Option<Gender>,
    pub class_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

pub fn update_student(conn: &Connection, id: &str, patch: StudentPatch) -> CoreResult<Student> {
    let existing = get_student(conn, id)?;
    let roll_number = optional_required("rollNumber", patch.roll_number.as_deref())?;
    let address = optional_required("address", patch.address.as_deref())?;
    let father_name = optional_required("fatherName", patch.father_name.as_deref())?;
    let name = optional_required("name", patch.name.as_deref())?;
    let email = optional_required("email", patch.email.as_deref())?;
    let dob = patch
        .dob
        .as_deref()
        .map(|v| dates::parse_day("dob", v))
        .transpose()?;
    if let Some(roll) = &roll_number {
        if roll_number_taken(conn, roll, Some(id))? {
            return Err(CoreError::duplicate("Roll number already exists"));
        }
    }
    if let Some(class_id) = &patch.class_id {
        store::require(conn, EntityKind::Class, class_id)?;
    }

    atomically(conn, |tx| {
        tx.execute(
            "UPDATE students SET
               roll_number = COALESCE(?, roll_number),
               dob = COALESCE(?, dob),
               address = COALESCE(?, address),
               father_name = COALESCE(?, father_name),
               gender = COALESCE(?, gender)
             WHERE id = ?",
            (&roll_number, dob, &address, &father_name, patch.gender, id),
        )
        .map_err(|e| map_unique(e, "Roll number already exists"))?;
        if name.is_some() || email.is_some() {
            tx.execute(
                "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email) WHERE id = ?",
                (&name, &email, &existing.user_id),
            )
            .map_err(|e| map_unique(e, "User already exists"))?;
        }
        if let Some(class_id) = &patch.class_id {
            relations::assign_student_to_class(tx, id, class_id)?;
        }
        Ok(())
    })?;
    tracing::info!(student_id = id, "student updated");
    get_student(conn, id)
}

/// Remove a student, their class memberships and their fee records.
pub fn delete_student(conn: &Connection, id: &str) -> CoreResult<()> {
    store::require(conn, EntityKind::Student, id)?;
    atomically(conn, |tx| {
        relations::detach_student(tx, id)?;
        let fees = tx.execute("DELETE FROM fees WHERE student_id = ?", [id])?;
        tx.execute("DELETE FROM student_fees WHERE student_id = ?", [id])?;
        store::delete_row(tx, EntityKind::Student, id)?;
        tracing::info!(student_id = id, fees, "student deleted");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Teachers

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub user_id: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub dob: String,
    pub address: String,
    pub mobile_no: String,
    pub father_name: String,
    pub gender: Gender,
}

const TEACHER_COLUMNS: &str = "id, user_id, dob, address, mobile_no, father_name, gender";

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        user_id: r.get(1)?,
        classes: BTreeSet::new(),
        subjects: BTreeSet::new(),
        dob: r.get(2)?,
        address: r.get(3)?,
        mobile_no: r.get(4)?,
        father_name: r.get(5)?,
        gender: r.get(6)?,
    })
}

fn with_teacher_sets(conn: &Connection, mut t: Teacher) -> CoreResult<Teacher> {
    t.classes = Link::TeacherClasses.members(conn, &t.id)?;
    t.subjects = Link::TeacherSubjects.members(conn, &t.id)?;
    Ok(t)
}

pub fn get_teacher(conn: &Connection, id: &str) -> CoreResult<Teacher> {
    let t = conn
        .query_row(
            &format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE id = ?"),
            [id],
            teacher_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("teacher", id))?;
    with_teacher_sets(conn, t)
}

pub fn list_teachers(conn: &Connection) -> CoreResult<Vec<Teacher>> {
    let mut stmt = conn.prepare(&format!("SELECT {TEACHER_COLUMNS} FROM teachers ORDER BY id"))?;
    let rows = stmt
        .query_map([], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|t| with_teacher_sets(conn, t)).collect()
}

pub fn create_teacher(conn: &Connection, input: NewTeacher) -> CoreResult<Teacher> {
    let address = required("address", &input.address)?;
    let mobile_no = required("mobileNo", &input.mobile_no)?;
    let father_name = required("fatherName", &input.father_name)?;
    let dob = dates::parse_day("dob", &input.dob)?;

    require_role(conn, &input.user_id, Role::Teacher)?;
    if profile_id(conn, "teachers", &input.user_id)?.is_some() {
        return Err(CoreError::duplicate("Teacher profile already exists for this user"));
    }
    store::require_all(conn, EntityKind::Class, &input.classes)?;
    store::require_all(conn, EntityKind::Subject, &input.subjects)?;

    let id = store::new_id();
    atomically(conn, |tx| {
        tx.execute(
            "INSERT INTO teachers(id, user_id, dob, address, mobile_no, father_name, gender)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (&id, &input.user_id, dob, &address, &mobile_no, &father_name, input.gender),
        )
        .map_err(|e| map_unique(e, "Teacher profile already exists for this user"))?;
        relations::attach_teacher_to_classes(tx, &id, &input.classes)?;
        relations::replace_set(
            tx,
            Link::TeacherSubjects,
            Link::SubjectTeachers,
            &id,
            &id_set(&input.subjects),
        )?;
        Ok(())
    })?;
    tracing::info!(teacher_id = %id, "teacher created");
    get_teacher(conn, &id)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherPatch {
    pub classes: Option<Vec<String>>,
    pub subjects: Option<Vec<String>>,
    pub dob: Option<String>,
    pub address: Option<String>,
    pub mobile_no: Option<String>,
    pub father_name: Option<String>,
    pub gender: Option<Gender>,
}

pub fn update_teacher(conn: &Connection, id: &str, patch: TeacherPatch) -> CoreResult<Teacher> {
    store::require(conn, EntityKind::Teacher, id)?;
    let address = optional_required("address", patch.address.as_deref())?;
    let mobile_no = optional_required("mobileNo", patch.mobile_no.as_deref())?;
    let father_name = optional_required("fatherName", patch.father_name.as_deref())?;
    let dob = patch
        .dob
        .as_deref()
        .map(|v| dates::parse_day("dob", v))
        .transpose()?;
    if let Some(classes) = &patch.classes {
        store::require_all(conn, EntityKind::Class, classes)?;
    }
    if let Some(subjects) = &patch.subjects {
        store::require_all(conn, EntityKind::Subject, subjects)?;
    }

    atomically(conn, |tx| {
        tx.execute(
            "UPDATE teachers SET
               dob = COALESCE(?, dob),
               address = COALESCE(?, address),
               mobile_no = COALESCE(?, mobile_no),
               father_name = COALESCE(?, father_name),
               gender = COALESCE(?, gender)
             WHERE id = ?",
            (dob, &address, &mobile_no, &father_name, patch.gender, id),
        )?;
        if let Some(classes) = &patch.classes {
            relations::replace_set(tx, Link::TeacherClasses, Link::ClassTeachers, id, &id_set(classes))?;
        }
        if let Some(subjects) = &patch.subjects {
            relations::replace_set(tx, Link::TeacherSubjects, Link::SubjectTeachers, id, &id_set(subjects))?;
        }
        Ok(())
    })?;
    tracing::info!(teacher_id = id, "teacher updated");
    get_teacher(conn, id)
}

pub fn delete_teacher(conn: &Connection, id: &str) -> CoreResult<()> {
    store::require(conn, EntityKind::Teacher, id)?;
    atomically(conn, |tx| {
        relations::detach_teacher(tx, id)?;
        store::delete_row(tx, EntityKind::Teacher, id)?;
        tracing::info!(teacher_id = id, "teacher deleted");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Subjects

pub fn normalize_subject_name(raw: &str) -> CoreResult<String> {
    Ok(required("name", raw)?.to_uppercase())
}

pub fn get_subject(conn: &Connection, id: &str) -> CoreResult<Subject> {
    let name: String = conn
        .query_row("SELECT name FROM subjects WHERE id = ?", [id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| CoreError::not_found("subject", id))?;
    Ok(Subject {
        id: id.to_string(),
        name,
        classes: Link::SubjectClasses.members(conn, id)?,
        teachers: Link::SubjectTeachers.members(conn, id)?,
    })
}

pub fn list_subjects(conn: &Connection) -> CoreResult<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id FROM subjects ORDER BY name")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|id| get_subject(conn, id)).collect()
}

pub fn create_subject(conn: &Connection, name: &str) -> CoreResult<Subject> {
    let name = normalize_subject_name(name)?;
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE name = ?", [&name], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(CoreError::duplicate("Subject already exists"));
    }
    let id = store::new_id();
    conn.execute("INSERT INTO subjects(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(|e| map_unique(e, "Subject already exists"))?;
    tracing::info!(subject_id = %id, name = %name, "subject created");
    get_subject(conn, &id)
}

pub fn delete_subject(conn: &Connection, id: &str) -> CoreResult<()> {
    store::require(conn, EntityKind::Subject, id)?;
    atomically(conn, |tx| {
        relations::detach_subject(tx, id)?;
        store::delete_row(tx, EntityKind::Subject, id)?;
        tracing::info!(subject_id = id, "subject deleted");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Exams

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExam {
    pub name: String,
    pub classes: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub date: String,
}

pub fn get_exam(conn: &Connection, id: &str) -> CoreResult<Exam> {
    let (name, date) = conn
        .query_row("SELECT name, date FROM exams WHERE id = ?", [id], |r| {
            Ok((r.get::<_, String>(0)?, r.get(1)?))
        })
        .optional()?
        .ok_or_else(|| CoreError::not_found("exam", id))?;
    Ok(Exam {
        id: id.to_string(),
        name,
        classes: Link::ExamClasses.members(conn, id)?,
        subjects: Link::ExamSubjects.members(conn, id)?,
        date,
    })
}

pub fn list_exams(conn: &Connection) -> CoreResult<Vec<Exam>> {
    let mut stmt = conn.prepare("SELECT id FROM exams ORDER BY date, name")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|id| get_exam(conn, id)).collect()
}

pub fn exams_for_class(conn: &Connection, class_id: &str) -> CoreResult<Vec<Exam>> {
    store::require(conn, EntityKind::Class, class_id)?;
    let mut exams = Link::ExamClasses
        .owners_of(conn, class_id)?
        .iter()
        .map(|id| get_exam(conn, id))
        .collect::<CoreResult<Vec<_>>>()?;
    exams.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    Ok(exams)
}

/// Exam sets have no mirror on the class or subject side.
fn set_exam_links(conn: &Connection, link: Link, exam_id: &str, ids: &[String]) -> CoreResult<()> {
    link.clear(conn, exam_id)?;
    for id in ids {
        link.add(conn, exam_id, id)?;
    }
    Ok(())
}

pub fn create_exam(conn: &Connection, input: NewExam) -> CoreResult<Exam> {
    let name = required("name", &input.name)?;
    let date = dates::parse_instant("date", &input.date)?;
    if input.classes.is_empty() {
        return Err(CoreError::validation("classes must not be empty"));
    }
    store::require_all(conn, EntityKind::Class, &input.classes)?;
    store::require_all(conn, EntityKind::Subject, &input.subjects)?;

    let id = store::new_id();
    atomically(conn, |tx| {
        tx.execute(
            "INSERT INTO exams(id, name, date) VALUES(?, ?, ?)",
            (&id, &name, date),
        )?;
        set_exam_links(tx, Link::ExamClasses, &id, &input.classes)?;
        set_exam_links(tx, Link::ExamSubjects, &id, &input.subjects)?;
        Ok(())
    })?;
    tracing::info!(exam_id = %id, "exam created");
    get_exam(conn, &id)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPatch {
    pub name: Option<String>,
    pub classes: Option<Vec<String>>,
    pub subjects: Option<Vec<String>>,
    pub date: Option<String>,
}

pub fn update_exam(conn: &Connection, id: &str, patch: ExamPatch) -> CoreResult<Exam> {
    store::require(conn, EntityKind::Exam, id)?;
    let name = optional_required("name", patch.name.as_deref())?;
    let date = dates::parse_optional_instant("date", patch.date.as_deref())?;
    if let Some(classes) = &patch.classes {
        if classes.is_empty() {
            return Err(CoreError::validation("classes must not be empty"));
        }
        store::require_all(conn, EntityKind::Class, classes)?;
    }
    if let Some(subjects) = &patch.subjects {
        store::require_all(conn, EntityKind::Subject, subjects)?;
    }

    atomically(conn, |tx| {
        tx.execute(
            "UPDATE exams SET name = COALESCE(?, name), date = COALESCE(?, date) WHERE id = ?",
            (&name, date, id),
        )?;
        if let Some(classes) = &patch.classes {
            set_exam_links(tx, Link::ExamClasses, id, classes)?;
        }
        if let Some(subjects) = &patch.subjects {
            set_exam_links(tx, Link::ExamSubjects, id, subjects)?;
        }
        Ok(())
    })?;
    tracing::info!(exam_id = id, "exam updated");
    get_exam(conn, id)
}

pub fn delete_exam(conn: &Connection, id: &str) -> CoreResult<()> {
    store::require(conn, EntityKind::Exam, id)?;
    atomically(conn, |tx| {
        Link::ExamClasses.clear(tx, id)?;
        Link::ExamSubjects.clear(tx, id)?;
        store::delete_row(tx, EntityKind::Exam, id)?;
        tracing::info!(exam_id = id, "exam deleted");
        Ok(())
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared seeding helpers for the ledger tests.

    use super::*;

    pub fn user(conn: &Connection, name: &str, role: Role) -> User {
        register_user(
            conn,
            NewUser {
                name: name.to_string(),
                email: format!("{}@school.test", name.to_lowercase().replace(' ', ".")),
                password_hash: "hash".to_string(),
                role,
            },
        )
        .expect("register user")
    }

    pub fn class(conn: &Connection, name: &str) -> Class {
        create_class(conn, name).expect("create class")
    }

    pub fn student(conn: &Connection, name: &str, roll: &str, class_id: &str) -> Student {
        let u = user(conn, name, Role::Student);
        create_student(
            conn,
            NewStudent {
                user_id: u.id,
                roll_number: roll.to_string(),
                class_id: class_id.to_string(),
                dob: "2010-04-01".to_string(),
                address: "1 School Road".to_string(),
                father_name: "Parent".to_string(),
                gender: Gender::Other,
            },
        )
        .expect("create student")
    }

    pub fn teacher(conn: &Connection, name: &str, classes: &[String]) -> Teacher {
        let u = user(conn, name, Role::Teacher);
        create_teacher(
            conn,
            NewTeacher {
                user_id: u.id,
                classes: classes.to_vec(),
                subjects: Vec::new(),
                dob: "1985-09-12".to_string(),
                address: "2 Staff Lane".to_string(),
                mobile_no: "555-0100".to_string(),
                father_name: "Parent".to_string(),
                gender: Gender::Female,
            },
        )
        .expect("create teacher")
    }

    pub fn subject(conn: &Connection, name: &str) -> Subject {
        create_subject(conn, name).expect("create subject")
    }

    pub fn exam(conn: &Connection, name: &str, class_id: &str, subjects: &[String]) -> Exam {
        create_exam(
            conn,
            NewExam {
                name: name.to_string(),
                classes: vec![class_id.to_string()],
                subjects: subjects.to_vec(),
                date: "2025-03-15".to_string(),
            },
        )
        .expect("create exam")
    }
}

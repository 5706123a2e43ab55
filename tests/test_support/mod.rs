#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    // Held so the workspace outlives the process.
    _workspace: Option<TempDir>,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn spawn_sidecar() -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
        _workspace: None,
    }
}

/// Spawn the daemon and select a fresh temporary workspace.
pub fn spawn_with_workspace() -> Sidecar {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut sidecar = spawn_sidecar();
    sidecar.ok("workspace.select", json!({ "path": dir.path().to_string_lossy() }));
    sidecar._workspace = Some(dir);
    sidecar
}

impl Sidecar {
    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{line}").expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {line}");
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{method} failed: {value}"
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Expect failure and return the error code.
    pub fn err(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{method} unexpectedly succeeded: {value}"
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }
}

pub fn str_at<'a>(v: &'a Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string at {pointer} in {v}"))
}

/// Minimal school: one class, one student, one teacher.
pub struct School {
    pub class_id: String,
    pub student_id: String,
    pub teacher_id: String,
}

pub fn register(s: &mut Sidecar, name: &str, role: &str) -> String {
    let email = format!("{}@school.test", name.to_lowercase().replace(' ', "."));
    let r = s.ok(
        "users.register",
        json!({ "name": name, "email": email, "passwordHash": "x", "role": role }),
    );
    str_at(&r, "/user/id").to_string()
}

pub fn create_class(s: &mut Sidecar, name: &str) -> String {
    let r = s.ok("classes.create", json!({ "name": name }));
    str_at(&r, "/classId").to_string()
}

pub fn create_student(s: &mut Sidecar, name: &str, roll: &str, class_id: &str) -> String {
    let user_id = register(s, name, "student");
    let r = s.ok(
        "students.create",
        json!({
            "userId": user_id,
            "rollNumber": roll,
            "classId": class_id,
            "dob": "2010-04-01",
            "address": "1 School Road",
            "fatherName": "Parent",
            "gender": "female"
        }),
    );
    str_at(&r, "/student/id").to_string()
}

pub fn create_teacher(s: &mut Sidecar, name: &str, class_ids: &[&str]) -> String {
    let user_id = register(s, name, "teacher");
    let r = s.ok(
        "teachers.create",
        json!({
            "userId": user_id,
            "classes": class_ids,
            "dob": "1984-02-02",
            "address": "2 Staff Lane",
            "mobileNo": "555-0100",
            "fatherName": "Parent",
            "gender": "male"
        }),
    );
    str_at(&r, "/teacher/id").to_string()
}

pub fn seed_school(s: &mut Sidecar) -> School {
    let class_id = create_class(s, "10-A");
    let student_id = create_student(s, "Student X", "R1", &class_id);
    let teacher_id = create_teacher(s, "Teacher T", &[&class_id]);
    School {
        class_id,
        student_id,
        teacher_id,
    }
}

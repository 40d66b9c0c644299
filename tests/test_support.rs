#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

/// Sends a request and unwraps `result`, failing the test on an error reply.
pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

/// Sends a request expected to fail and returns the error code.
pub fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

/// Boots a sidecar with a fresh workspace selected.
pub fn boot(prefix: &str) -> (Child, ChildStdin, BufReader<ChildStdout>, PathBuf) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "boot-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (child, stdin, reader, workspace)
}

/// Creates a college and returns its id.
pub fn seed_college(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
    code: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("seed-college-{code}"),
        "colleges.create",
        json!({ "name": name, "code": code }),
    );
    created
        .get("collegeId")
        .and_then(|v| v.as_str())
        .expect("collegeId")
        .to_string()
}

/// Creates a student and returns its id.
pub fn seed_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    college_id: &str,
    code: &str,
    name: &str,
    course: &str,
    year: i64,
    status: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("seed-student-{code}"),
        "students.create",
        json!({
            "studentCode": code,
            "fullName": name,
            "collegeId": college_id,
            "course": course,
            "year": year,
            "status": status,
        }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

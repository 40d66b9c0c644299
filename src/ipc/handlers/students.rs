use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, opt_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::StudentStatus;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn student_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "studentCode": row.get::<_, String>(1)?,
        "fullName": row.get::<_, String>(2)?,
        "email": row.get::<_, Option<String>>(3)?,
        "phone": row.get::<_, Option<String>>(4)?,
        "collegeId": row.get::<_, String>(5)?,
        "course": row.get::<_, String>(6)?,
        "year": row.get::<_, i64>(7)?,
        "section": row.get::<_, Option<String>>(8)?,
        "status": row.get::<_, String>(9)?,
        "createdAt": row.get::<_, String>(10)?,
        "collegeName": row.get::<_, Option<String>>(11)?,
    }))
}

const STUDENT_SELECT: &str = "SELECT
    s.id, s.student_code, s.full_name, s.email, s.phone, s.college_id,
    s.course, s.year, s.section, s.status, s.created_at, c.name
  FROM students s
  LEFT JOIN colleges c ON c.id = s.college_id";

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let status = match opt_str(req, "status") {
        Some(s) => match StudentStatus::parse(&s) {
            Some(v) => Some(v),
            None => {
                return err(
                    &req.id,
                    "invalid_status",
                    "status must be one of: active, inactive, graduated, transferred",
                    Some(json!({ "status": s })),
                )
            }
        },
        None => None,
    };
    let search = opt_str(req, "search").map(|s| s.to_lowercase());

    let sql = format!("{STUDENT_SELECT} ORDER BY s.created_at DESC, s.rowid DESC");
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let status: String = row.get(9)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let course: String = row.get(6)?;
            let email: Option<String> = row.get(3)?;
            Ok((student_row_json(row)?, status, code, name, course, email))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Search spans name, code, course, and email, mirroring the roster screen.
    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(_, row_status, code, name, course, email)| {
            if let Some(want) = status {
                if row_status != want.as_str() {
                    return false;
                }
            }
            if let Some(q) = search.as_deref() {
                let email_hit = email
                    .as_deref()
                    .map(|e| e.to_lowercase().contains(q))
                    .unwrap_or(false);
                return name.to_lowercase().contains(q)
                    || code.to_lowercase().contains(q)
                    || course.to_lowercase().contains(q)
                    || email_hit;
            }
            true
        })
        .map(|(json, ..)| json)
        .collect();

    ok(&req.id, json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_code = match opt_str(req, "studentCode") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentCode", None),
    };
    let full_name = match opt_str(req, "fullName") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing fullName", None),
    };
    let college_id = match opt_str(req, "collegeId") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing collegeId", None),
    };
    let course = match opt_str(req, "course") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing course", None),
    };
    let year = match req.params.get("year").and_then(|v| v.as_i64()) {
        Some(v) if (1..=4).contains(&v) => v,
        Some(_) => return err(&req.id, "bad_params", "year must be between 1 and 4", None),
        None => return err(&req.id, "bad_params", "missing year", None),
    };
    let status = match opt_str(req, "status") {
        Some(s) => match StudentStatus::parse(&s) {
            Some(v) => v,
            None => {
                return err(
                    &req.id,
                    "invalid_status",
                    "status must be one of: active, inactive, graduated, transferred",
                    Some(json!({ "status": s })),
                )
            }
        },
        None => StudentStatus::Active,
    };
    let email = opt_str(req, "email");
    let phone = opt_str(req, "phone");
    let section = opt_str(req, "section");

    let college_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM colleges WHERE id = ?", [&college_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if college_exists.is_none() {
        return err(&req.id, "not_found", "college not found", None);
    }

    let student_id = Uuid::new_v4().to_string();
    let created_by = state.auth.as_ref().map(|a| a.user_id.clone());
    let now = now_iso();
    if let Err(e) = conn.execute(
        "INSERT INTO students(
           id, student_code, full_name, email, phone, college_id,
           course, year, section, status, created_by, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &student_id,
            &student_code,
            &full_name,
            email.as_deref(),
            phone.as_deref(),
            &college_id,
            &course,
            year,
            section.as_deref(),
            status.as_str(),
            created_by.as_deref(),
            &now,
            &now,
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let mut set_parts: Vec<String> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();

    for (key, column) in [
        ("studentCode", "student_code"),
        ("fullName", "full_name"),
        ("course", "course"),
    ] {
        if let Some(v) = patch.get(key) {
            let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be a non-empty string", key),
                    None,
                );
            };
            set_parts.push(format!("{} = ?", column));
            binds.push(rusqlite::types::Value::Text(s.to_string()));
        }
    }
    for (key, column) in [("email", "email"), ("phone", "phone"), ("section", "section")] {
        if let Some(v) = patch.get(key) {
            if v.is_null() {
                set_parts.push(format!("{} = NULL", column));
            } else if let Some(s) = v.as_str() {
                set_parts.push(format!("{} = ?", column));
                binds.push(rusqlite::types::Value::Text(s.trim().to_string()));
            } else {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be string or null", key),
                    None,
                );
            }
        }
    }
    if let Some(v) = patch.get("year") {
        let Some(year) = v.as_i64().filter(|y| (1..=4).contains(y)) else {
            return err(&req.id, "bad_params", "patch.year must be between 1 and 4", None);
        };
        set_parts.push("year = ?".to_string());
        binds.push(rusqlite::types::Value::Integer(year));
    }
    if let Some(v) = patch.get("status") {
        let status = v.as_str().and_then(StudentStatus::parse);
        let Some(status) = status else {
            return err(
                &req.id,
                "invalid_status",
                "patch.status must be one of: active, inactive, graduated, transferred",
                None,
            );
        };
        set_parts.push("status = ?".to_string());
        binds.push(rusqlite::types::Value::Text(status.as_str().to_string()));
    }
    if let Some(v) = patch.get("collegeId") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.collegeId must be a non-empty string", None);
        };
        let exists: Option<i64> = match conn
            .query_row("SELECT 1 FROM colleges WHERE id = ?", [s], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if exists.is_none() {
            return err(&req.id, "not_found", "college not found", None);
        }
        set_parts.push("college_id = ?".to_string());
        binds.push(rusqlite::types::Value::Text(s.to_string()));
    }
    if set_parts.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognized fields", None);
    }

    let sql = format!(
        "UPDATE students SET {}, updated_at = ? WHERE id = ?",
        set_parts.join(", ")
    );
    binds.push(rusqlite::types::Value::Text(now_iso()));
    binds.push(rusqlite::types::Value::Text(student_id.clone()));
    match conn.execute(&sql, rusqlite::params_from_iter(binds)) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // No ON DELETE CASCADE; delete in dependency order.
    if let Err(e) = tx.execute("DELETE FROM attendance WHERE student_id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "attendance" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}

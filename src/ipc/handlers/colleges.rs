use crate::ipc::error::{err, ok};
use crate::ipc::helpers::now_iso;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_colleges_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "colleges": [] }));
    };

    // Include the enrollment count so the UI can show it without a second call.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.code,
           c.address,
           (SELECT COUNT(*) FROM students s WHERE s.college_id = c.id) AS student_count
         FROM colleges c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "code": row.get::<_, String>(2)?,
                "address": row.get::<_, Option<String>>(3)?,
                "studentCount": row.get::<_, i64>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(colleges) => ok(&req.id, json!({ "colleges": colleges })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_colleges_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    let code = match req.params.get("code").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing code", None),
    };
    if name.is_empty() || code.is_empty() {
        return err(&req.id, "bad_params", "name/code must not be empty", None);
    }
    let address = req
        .params
        .get("address")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let code_taken: Option<i64> = match conn
        .query_row("SELECT 1 FROM colleges WHERE code = ?", [&code], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if code_taken.is_some() {
        return err(
            &req.id,
            "conflict",
            "a college with this code already exists",
            Some(json!({ "code": code })),
        );
    }

    let college_id = Uuid::new_v4().to_string();
    let now = now_iso();
    if let Err(e) = conn.execute(
        "INSERT INTO colleges(id, name, code, address, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&college_id, &name, &code, address.as_deref(), &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "colleges" })),
        );
    }

    ok(
        &req.id,
        json!({ "collegeId": college_id, "name": name, "code": code }),
    )
}

fn handle_colleges_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let college_id = match req.params.get("collegeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing collegeId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let mut set_parts: Vec<&str> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(v) = patch.get("name") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.name must be a non-empty string", None);
        };
        set_parts.push("name = ?");
        binds.push(rusqlite::types::Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("code") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.code must be a non-empty string", None);
        };
        let clash: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM colleges WHERE code = ? AND id != ?",
                (s, &college_id),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if clash.is_some() {
            return err(
                &req.id,
                "conflict",
                "a college with this code already exists",
                Some(json!({ "code": s })),
            );
        }
        set_parts.push("code = ?");
        binds.push(rusqlite::types::Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("address") {
        if v.is_null() {
            set_parts.push("address = NULL");
        } else if let Some(s) = v.as_str() {
            set_parts.push("address = ?");
            binds.push(rusqlite::types::Value::Text(s.trim().to_string()));
        } else {
            return err(&req.id, "bad_params", "patch.address must be string or null", None);
        }
    }
    if set_parts.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognized fields", None);
    }

    let sql = format!(
        "UPDATE colleges SET {}, updated_at = ? WHERE id = ?",
        set_parts.join(", ")
    );
    binds.push(rusqlite::types::Value::Text(now_iso()));
    binds.push(rusqlite::types::Value::Text(college_id.clone()));
    match conn.execute(&sql, rusqlite::params_from_iter(binds)) {
        Ok(0) => err(&req.id, "not_found", "college not found", None),
        Ok(_) => ok(&req.id, json!({ "collegeId": college_id })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "colleges" })),
        ),
    }
}

fn handle_colleges_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let college_id = match req.params.get("collegeId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing collegeId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM colleges WHERE id = ?", [&college_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "college not found", None);
    }

    let enrolled: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM students WHERE college_id = ?",
        [&college_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if enrolled > 0 {
        return err(
            &req.id,
            "college_in_use",
            "college still has students; reassign or delete them first",
            Some(json!({ "studentCount": enrolled })),
        );
    }

    if let Err(e) = conn.execute("DELETE FROM colleges WHERE id = ?", [&college_id]) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "colleges" })),
        );
    }
    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "colleges.list" => Some(handle_colleges_list(state, req)),
        "colleges.create" => Some(handle_colleges_create(state, req)),
        "colleges.update" => Some(handle_colleges_update(state, req)),
        "colleges.delete" => Some(handle_colleges_delete(state, req)),
        _ => None,
    }
}

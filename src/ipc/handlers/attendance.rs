use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, opt_i64, opt_str};
use crate::ipc::types::{AppState, Request};
use crate::roster::{
    self, AttendanceStatus, DateRecord, MarkingSheet, SheetEntry, SheetFilter, Student,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn db(e: impl ToString) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn parse_date(raw: &str) -> Result<String, HandlerErr> {
    let trimmed = raw.trim();
    match chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(_) => Ok(trimmed.to_string()),
        Err(_) => Err(HandlerErr {
            code: "invalid_date",
            message: "date must be YYYY-MM-DD".to_string(),
            details: None,
        }),
    }
}

fn parse_status(raw: &str) -> Result<AttendanceStatus, HandlerErr> {
    AttendanceStatus::parse(raw).ok_or_else(|| HandlerErr {
        code: "invalid_status",
        message: "status must be one of: present, absent, late, excused".to_string(),
        details: Some(json!({ "status": raw })),
    })
}

/// The roster eligible for marking: active students, name order. Lifecycle
/// filtering happens here, not in the merge.
fn load_active_roster(conn: &Connection) -> Result<Vec<Student>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.student_code, s.full_name, s.course, s.year, s.section,
                    s.college_id, c.name
             FROM students s
             LEFT JOIN colleges c ON c.id = s.college_id
             WHERE s.status = 'active'
             ORDER BY s.full_name",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([], |r| {
        Ok(Student {
            id: r.get(0)?,
            student_code: r.get(1)?,
            full_name: r.get(2)?,
            course: r.get(3)?,
            year: r.get(4)?,
            section: r.get(5)?,
            college_id: r.get(6)?,
            college_name: r.get(7)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::db)
}

fn load_records_for_date(conn: &Connection, date: &str) -> Result<Vec<DateRecord>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status, marked_by, updated_at
             FROM attendance
             WHERE date = ?",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([date], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut records = Vec::with_capacity(rows.len());
    for (student_id, status, marked_by, updated_at) in rows {
        // Rows with a status this build doesn't know are skipped, not fatal.
        let Some(status) = AttendanceStatus::parse(&status) else {
            log::warn!("attendance row for {student_id} on {date} has unknown status {status:?}");
            continue;
        };
        records.push(DateRecord {
            student_id,
            status,
            marked_by,
            updated_at,
        });
    }
    Ok(records)
}

fn filter_domains(sheet: &MarkingSheet) -> (Vec<String>, Vec<String>, Vec<i64>) {
    let mut courses: Vec<String> = Vec::new();
    let mut sections: Vec<String> = Vec::new();
    let mut years: Vec<i64> = Vec::new();
    for entry in &sheet.entries {
        let s = &entry.student;
        if !courses.contains(&s.course) {
            courses.push(s.course.clone());
        }
        if let Some(section) = s.section.as_ref() {
            if !sections.contains(section) {
                sections.push(section.clone());
            }
        }
        if !years.contains(&s.year) {
            years.push(s.year);
        }
    }
    courses.sort();
    sections.sort();
    years.sort();
    (courses, sections, years)
}

fn entries_json(entries: &[&SheetEntry]) -> Vec<serde_json::Value> {
    entries
        .iter()
        .map(|e| serde_json::to_value(e).unwrap_or(serde_json::Value::Null))
        .collect()
}

fn sheet_response(sheet: &MarkingSheet, filter: &SheetFilter) -> serde_json::Value {
    let entries = roster::filter_entries(sheet, filter);
    let summary = roster::summarize(entries.iter().copied());
    let (courses, sections, years) = filter_domains(sheet);
    json!({
        "date": sheet.date,
        "sheetSeq": sheet.seq,
        "students": entries_json(&entries),
        "summary": summary,
        "courses": courses,
        "sections": sections,
        "years": years,
    })
}

fn open_sheet(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(no_workspace)?;
    let date = parse_date(&get_required_str(&req.params, "date")?)?;

    // Roster and the date's records are both in hand before any merge starts.
    let roster_rows = load_active_roster(conn)?;
    let records = load_records_for_date(conn, &date)?;

    state.sheet_seq += 1;
    let sheet = roster::build_sheet(&date, state.sheet_seq, roster_rows, &records);
    let response = sheet_response(&sheet, &SheetFilter::default());
    if !roster::install_sheet(&mut state.sheet, sheet) {
        // Unreachable with a monotonic counter, but the guard is what keeps a
        // superseded load from ever landing in the visible sheet.
        return Err(HandlerErr {
            code: "stale_sheet",
            message: "a newer sheet load superseded this one".to_string(),
            details: None,
        });
    }
    Ok(response)
}

fn view_filter(req: &Request) -> SheetFilter {
    SheetFilter {
        search: opt_str(req, "search"),
        course: opt_str(req, "course"),
        section: opt_str(req, "section"),
        year: opt_i64(req, "year"),
    }
}

fn sheet_view(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet = state.sheet.as_ref().ok_or_else(no_sheet)?;
    let filter = view_filter(req);
    let entries = roster::filter_entries(sheet, &filter);
    let summary = roster::summarize(entries.iter().copied());
    Ok(json!({
        "date": sheet.date,
        "sheetSeq": sheet.seq,
        "students": entries_json(&entries),
        "summary": summary,
    }))
}

fn set_status(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date(&get_required_str(&req.params, "date")?)?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let status = parse_status(&get_required_str(&req.params, "status")?)?;

    let marked_by = state.auth.as_ref().map(|a| a.user_id.clone());
    let sheet = state.sheet.as_mut().ok_or_else(no_sheet)?;
    if sheet.date != date {
        return Err(stale_sheet(&sheet.date, &date));
    }

    let now = now_iso();
    if !roster::set_status(sheet, &student_id, status, marked_by.as_deref(), &now) {
        return Err(HandlerErr {
            code: "not_found",
            message: "student is not on the open sheet".to_string(),
            details: None,
        });
    }

    let summary = roster::summarize(sheet.entries.iter());
    Ok(json!({ "studentId": student_id, "status": status, "summary": summary }))
}

fn save_sheet(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date(&get_required_str(&req.params, "date")?)?;
    let sheet = state.sheet.as_ref().ok_or_else(no_sheet)?;
    if sheet.date != date {
        return Err(stale_sheet(&sheet.date, &date));
    }

    let staged = roster::staged_records(sheet);
    if staged.is_empty() {
        // Guard condition, not a failure: nothing staged means nothing is
        // deleted either.
        return Err(HandlerErr {
            code: "nothing_to_save",
            message: "no attendance records to save".to_string(),
            details: None,
        });
    }

    let conn = state.db.as_ref().ok_or_else(no_workspace)?;
    let now = now_iso();

    // Replace-for-date. Delete and insert ride one transaction so a failed
    // insert cannot leave the date emptied out.
    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute("DELETE FROM attendance WHERE date = ?", [&date])
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance" })),
        })?;
    for record in &staged {
        tx.execute(
            "INSERT INTO attendance(
               id, student_id, date, status, marked_by, created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &record.student_id,
                &date,
                record.status.as_str(),
                record.marked_by.as_deref(),
                &now,
                &now,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance" })),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    log::info!("attendance saved: {} records for {}", staged.len(), date);
    Ok(json!({ "date": date, "saved": staged.len() }))
}

fn no_workspace() -> HandlerErr {
    HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    }
}

fn no_sheet() -> HandlerErr {
    HandlerErr {
        code: "no_sheet",
        message: "open an attendance sheet first".to_string(),
        details: None,
    }
}

fn stale_sheet(open_date: &str, requested: &str) -> HandlerErr {
    HandlerErr {
        code: "stale_sheet",
        message: format!("open sheet is for {open_date}, not {requested}"),
        details: Some(json!({ "openDate": open_date, "requestedDate": requested })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.sheetOpen" => open_sheet(state, req),
        "attendance.sheetView" => sheet_view(state, req),
        "attendance.setStatus" => set_status(state, req),
        "attendance.save" => save_sheet(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    })
}

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{date_param, db_conn};
use crate::ipc::types::{AppState, Request};
use crate::roster::AttendanceStatus;
use crate::stats::{self, MarkRow, StudentFacts};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

const DEFAULT_TREND_DAYS: u64 = 7;
const DEFAULT_COURSE_LIMIT: usize = 8;

fn load_student_facts(conn: &Connection) -> Result<Vec<StudentFacts>, String> {
    let mut stmt = conn
        .prepare("SELECT status, year, course FROM students")
        .map_err(|e| e.to_string())?;
    stmt.query_map([], |r| {
        Ok(StudentFacts {
            status: r.get(0)?,
            year: r.get(1)?,
            course: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| e.to_string())
}

fn load_marks(conn: &Connection, where_sql: &str, bind: &str) -> Result<Vec<MarkRow>, String> {
    let sql = format!("SELECT date, status FROM attendance WHERE {where_sql}");
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([bind], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| e.to_string())?;
    Ok(rows
        .into_iter()
        .filter_map(|(date, status)| {
            AttendanceStatus::parse(&status).map(|status| MarkRow { date, status })
        })
        .collect())
}

fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let date = match date_param(req, "date") {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let total_students: i64 = match conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let total_colleges: i64 = match conn.query_row("SELECT COUNT(*) FROM colleges", [], |r| r.get(0))
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let marks = match load_marks(conn, "date = ?", &date) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    };

    ok(
        &req.id,
        json!({
            "date": date,
            "totalStudents": total_students,
            "totalColleges": total_colleges,
            "attendanceToday": marks.len(),
            "attendanceRate": stats::attendance_rate(&marks),
        }),
    )
}

fn handle_students_by_year(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match load_student_facts(conn) {
        Ok(facts) => ok(&req.id, json!({ "years": stats::count_by_year(&facts) })),
        Err(e) => err(&req.id, "db_query_failed", e, None),
    }
}

fn handle_students_by_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match load_student_facts(conn) {
        Ok(facts) => ok(&req.id, json!({ "statuses": stats::count_by_status(&facts) })),
        Err(e) => err(&req.id, "db_query_failed", e, None),
    }
}

fn handle_attendance_by_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let anchor = match date_param(req, "date") {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let days = match req.params.get("days") {
        None => DEFAULT_TREND_DAYS,
        Some(v) => match v.as_u64().filter(|d| (1..=366).contains(d)) {
            Some(d) => d,
            None => return err(&req.id, "bad_params", "days must be between 1 and 366", None),
        },
    };

    // date_param already validated the shape.
    let Ok(today) = NaiveDate::parse_from_str(&anchor, "%Y-%m-%d") else {
        return err(&req.id, "invalid_date", "date must be YYYY-MM-DD", None);
    };
    let cutoff = today
        .checked_sub_days(chrono::Days::new(days))
        .unwrap_or(NaiveDate::MIN)
        .format("%Y-%m-%d")
        .to_string();

    let marks = match load_marks(conn, "date >= ?", &cutoff) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    };
    ok(
        &req.id,
        json!({
            "date": anchor,
            "days": days,
            "series": stats::count_by_date_window(&marks, today, days),
        }),
    )
}

fn handle_top_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let limit = match req.params.get("limit") {
        None => DEFAULT_COURSE_LIMIT,
        Some(v) => match v.as_u64().filter(|l| *l >= 1) {
            Some(l) => l as usize,
            None => return err(&req.id, "bad_params", "limit must be a positive integer", None),
        },
    };
    match load_student_facts(conn) {
        Ok(facts) => ok(
            &req.id,
            json!({ "courses": stats::top_courses(&facts, limit) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e, None),
    }
}

fn handle_dashboard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let date = match date_param(req, "date") {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let active_students: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM students WHERE status = 'active'",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let marks = match load_marks(conn, "date = ?", &date) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    };
    let present = marks
        .iter()
        .filter(|m| m.status == AttendanceStatus::Present)
        .count();
    let absent = marks
        .iter()
        .filter(|m| m.status == AttendanceStatus::Absent)
        .count();
    // The dashboard rate is over the active roster, unlike the analytics rate
    // which is over marked records only.
    let rate = if active_students > 0 {
        (present as f64 / active_students as f64) * 100.0
    } else {
        0.0
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.student_code, s.full_name, s.course, s.year, c.name
         FROM students s
         LEFT JOIN colleges c ON c.id = s.college_id
         WHERE s.status = 'active'
         ORDER BY s.created_at DESC, s.rowid DESC
         LIMIT 5",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let recent = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentCode": r.get::<_, String>(1)?,
                "fullName": r.get::<_, String>(2)?,
                "course": r.get::<_, String>(3)?,
                "year": r.get::<_, i64>(4)?,
                "collegeName": r.get::<_, Option<String>>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let recent = match recent {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "date": date,
            "totalStudents": active_students,
            "totalPresent": present,
            "totalAbsent": absent,
            "attendanceRate": rate,
            "recentStudents": recent,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.overview" => Some(handle_overview(state, req)),
        "analytics.studentsByYear" => Some(handle_students_by_year(state, req)),
        "analytics.studentsByStatus" => Some(handle_students_by_status(state, req)),
        "analytics.attendanceByDate" => Some(handle_attendance_by_date(state, req)),
        "analytics.topCourses" => Some(handle_top_courses(state, req)),
        "dashboard.open" => Some(handle_dashboard_open(state, req)),
        _ => None,
    }
}

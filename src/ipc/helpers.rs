use rusqlite::Connection;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Optional string param; whitespace-only collapses to None.
pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn opt_i64(req: &Request, key: &str) -> Option<i64> {
    req.params.get(key).and_then(|v| v.as_i64())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn today_str() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Validates a YYYY-MM-DD date param; defaults to today when absent.
pub fn date_param(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let Some(raw) = opt_str(req, key) else {
        return Ok(today_str());
    };
    match chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(_) => Ok(raw),
        Err(_) => Err(err(
            &req.id,
            "invalid_date",
            format!("{} must be YYYY-MM-DD", key),
            None,
        )),
    }
}

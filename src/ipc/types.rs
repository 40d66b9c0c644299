use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::roster::MarkingSheet;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The signed-in identity; set by auth.signIn/signUp, cleared by auth.signOut.
/// Used to stamp marked_by/created_by on writes.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: String,
    pub token: String,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub auth: Option<AuthedUser>,
    /// The marking sheet currently held in memory, if a date is open.
    pub sheet: Option<MarkingSheet>,
    /// Monotonic sheet-load counter backing the supersession guard.
    pub sheet_seq: u64,
}

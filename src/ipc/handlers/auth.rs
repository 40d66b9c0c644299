use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_iso, required_str};
use crate::ipc::types::{AppState, AuthedUser, Request};

#[derive(Debug)]
struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
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

fn hash_password(password: &str) -> Result<String, HandlerErr> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HandlerErr {
            code: "hash_failed",
            message: e.to_string(),
            details: None,
        })
}

fn verify_password(password: &str, hash: &str) -> Result<bool, HandlerErr> {
    let parsed = PasswordHash::new(hash).map_err(|_| HandlerErr {
        code: "hash_failed",
        message: "stored password hash is malformed".to_string(),
        details: None,
    })?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HandlerErr {
            code: "hash_failed",
            message: e.to_string(),
            details: None,
        }),
    }
}

fn password_weaknesses(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if password.len() < 8 {
        errors.push("password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        errors.push("password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        errors.push("password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("password must contain at least one digit");
    }
    errors
}

fn normalize_email(raw: &str) -> Result<String, HandlerErr> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(HandlerErr {
            code: "bad_params",
            message: "email must be a valid address".to_string(),
            details: None,
        });
    }
    Ok(email)
}

fn open_session(conn: &Connection, user_id: &str) -> Result<String, HandlerErr> {
    let token = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at) VALUES(?, ?, ?)",
        (&token, user_id, now_iso()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "sessions" })),
    })?;
    Ok(token)
}

fn profile_json(conn: &Connection, user_id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        "SELECT p.id, p.full_name, p.email, p.role, p.college_id, p.avatar_url, c.name
         FROM profiles p
         LEFT JOIN colleges c ON c.id = p.college_id
         WHERE p.user_id = ?",
        [user_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "userId": user_id,
                "fullName": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "role": r.get::<_, String>(3)?,
                "collegeId": r.get::<_, Option<String>>(4)?,
                "avatarUrl": r.get::<_, Option<String>>(5)?,
                "collegeName": r.get::<_, Option<String>>(6)?,
            }))
        },
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn sign_up(
    conn: &Connection,
    req: &Request,
) -> Result<(String, String, serde_json::Value), HandlerErr> {
    let email = normalize_email(&get_required_str(&req.params, "email")?)?;
    let password = get_required_str(&req.params, "password")?;
    let full_name = get_required_str(&req.params, "fullName")?.trim().to_string();
    if full_name.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "fullName must not be empty".to_string(),
            details: None,
        });
    }
    let weaknesses = password_weaknesses(&password);
    if !weaknesses.is_empty() {
        return Err(HandlerErr {
            code: "weak_password",
            message: "password does not meet requirements".to_string(),
            details: Some(json!({ "requirements": weaknesses })),
        });
    }

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db)?;
    if taken.is_some() {
        return Err(HandlerErr {
            code: "conflict",
            message: "an account with this email already exists".to_string(),
            details: None,
        });
    }

    let user_id = Uuid::new_v4().to_string();
    let profile_id = Uuid::new_v4().to_string();
    let hash = hash_password(&password)?;
    let now = now_iso();

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    tx.execute(
        "INSERT INTO users(id, email, password_hash, created_at) VALUES(?, ?, ?, ?)",
        (&user_id, &email, &hash, &now),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "users" })),
    })?;
    tx.execute(
        "INSERT INTO profiles(id, user_id, full_name, email, role, created_at, updated_at)
         VALUES(?, ?, ?, ?, 'staff', ?, ?)",
        (&profile_id, &user_id, &full_name, &email, &now, &now),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "profiles" })),
    })?;
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    // Accounts are auto-confirmed: a successful sign-up is also a sign-in.
    let token = open_session(conn, &user_id)?;
    let profile = profile_json(conn, &user_id)?.unwrap_or(serde_json::Value::Null);
    Ok((user_id, token, profile))
}

fn sign_in(conn: &Connection, req: &Request) -> Result<(String, String), HandlerErr> {
    let email = normalize_email(&get_required_str(&req.params, "email")?)?;
    let password = get_required_str(&req.params, "password")?;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some((user_id, stored_hash)) = row else {
        return Err(invalid_credentials());
    };
    if !verify_password(&password, &stored_hash)? {
        return Err(invalid_credentials());
    }

    let token = open_session(conn, &user_id)?;
    Ok((user_id, token))
}

fn invalid_credentials() -> HandlerErr {
    HandlerErr {
        code: "invalid_credentials",
        message: "email or password is incorrect".to_string(),
        details: None,
    }
}

fn handle_sign_up(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match sign_up(conn, req) {
        Ok((user_id, token, profile)) => {
            state.auth = Some(AuthedUser {
                user_id: user_id.clone(),
                token: token.clone(),
            });
            ok(
                &req.id,
                json!({ "userId": user_id, "token": token, "profile": profile }),
            )
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match sign_in(conn, req) {
        Ok((user_id, token)) => {
            state.auth = Some(AuthedUser {
                user_id: user_id.clone(),
                token: token.clone(),
            });
            log::info!("sign-in: user {user_id}");
            ok(&req.id, json!({ "userId": user_id, "token": token }))
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let (Some(conn), Some(auth)) = (state.db.as_ref(), state.auth.as_ref()) {
        if let Err(e) = conn.execute("DELETE FROM sessions WHERE token = ?", [&auth.token]) {
            log::warn!("session row cleanup failed: {e}");
        }
    }
    // Tearing down identity also drops any marking session in progress.
    state.auth = None;
    state.sheet = None;
    ok(&req.id, json!({ "signedOut": true }))
}

fn handle_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(auth) = state.auth.as_ref() else {
        return ok(&req.id, json!({ "user": serde_json::Value::Null }));
    };
    match profile_json(conn, &auth.user_id) {
        Ok(profile) => ok(
            &req.id,
            json!({
                "user": { "id": auth.user_id, "token": auth.token },
                "profile": profile
            }),
        ),
        Err(error) => error.response(&req.id),
    }
}

fn handle_profile_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(auth) = state.auth.as_ref() else {
        return err(&req.id, "not_authenticated", "sign in first", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let mut set_parts: Vec<&str> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();
    if let Some(v) = patch.get("fullName") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(
                &req.id,
                "bad_params",
                "patch.fullName must be a non-empty string",
                None,
            );
        };
        set_parts.push("full_name = ?");
        binds.push(rusqlite::types::Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("avatarUrl") {
        if v.is_null() {
            set_parts.push("avatar_url = NULL");
        } else if let Some(s) = v.as_str() {
            set_parts.push("avatar_url = ?");
            binds.push(rusqlite::types::Value::Text(s.trim().to_string()));
        } else {
            return err(
                &req.id,
                "bad_params",
                "patch.avatarUrl must be string or null",
                None,
            );
        }
    }
    if set_parts.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognized fields", None);
    }

    let sql = format!(
        "UPDATE profiles SET {}, updated_at = ? WHERE user_id = ?",
        set_parts.join(", ")
    );
    binds.push(rusqlite::types::Value::Text(now_iso()));
    binds.push(rusqlite::types::Value::Text(auth.user_id.clone()));
    match conn.execute(&sql, rusqlite::params_from_iter(binds)) {
        Ok(0) => err(&req.id, "not_found", "profile not found", None),
        Ok(_) => match profile_json(conn, &auth.user_id) {
            Ok(profile) => ok(&req.id, json!({ "profile": profile })),
            Err(error) => error.response(&req.id),
        },
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "profiles" })),
        ),
    }
}

fn handle_change_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(auth) = state.auth.as_ref() else {
        return err(&req.id, "not_authenticated", "sign in first", None);
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let weaknesses = password_weaknesses(&password);
    if !weaknesses.is_empty() {
        return err(
            &req.id,
            "weak_password",
            "password does not meet requirements",
            Some(json!({ "requirements": weaknesses })),
        );
    }
    let hash = match hash_password(&password) {
        Ok(h) => h,
        Err(error) => return error.response(&req.id),
    };
    match conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (&hash, &auth.user_id),
    ) {
        Ok(_) => ok(&req.id, json!({ "changed": true })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signUp" => Some(handle_sign_up(state, req)),
        "auth.signIn" => Some(handle_sign_in(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.session" => Some(handle_session(state, req)),
        "auth.changePassword" => Some(handle_change_password(state, req)),
        "profile.update" => Some(handle_profile_update(state, req)),
        _ => None,
    }
}

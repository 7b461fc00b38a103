use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::merge::{self, FieldKind, FieldSpec, MergeRule};
use crate::security;

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: "first_name",
        column: "first_name",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "surname",
        column: "surname",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "full_name",
        column: "full_name",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "email",
        column: "email",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "role",
        column: "role",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "must_change_password",
        column: "must_change_password",
        kind: FieldKind::Flag,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
];

const USER_SELECT: &str = "SELECT
       id,
       first_name,
       surname,
       full_name,
       email,
       role,
       must_change_password
     FROM users";

fn user_row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get("id")?;
    let mut map = merge::row_to_json(row, USER_FIELDS)?;
    map.insert("id".to_string(), json!(id));
    Ok(serde_json::Value::Object(map))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let sql = format!("{} ORDER BY role ASC, full_name ASC", USER_SELECT);
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], user_row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(first_name) = req.params.get("first_name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing first_name", None);
    };
    let Some(surname) = req.params.get("surname").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing surname", None);
    };
    let Some(role) = req.params.get("role").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing role", None);
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };
    let email = req
        .params
        .get("email")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let full_name = format!("{} {}", first_name, surname).trim().to_string();
    let hashed = security::hash_password(password);

    // Light duplicate guard only; full_name + email is what the UI keys on.
    let duplicate: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM users WHERE full_name = ? AND email = ?",
            (&full_name, email),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if duplicate.is_some() {
        return err(
            &req.id,
            "duplicate_user",
            "a user with this name and email already exists",
            None,
        );
    }

    if let Err(e) = conn.execute(
        "INSERT INTO users(
           first_name,
           surname,
           full_name,
           email,
           role,
           password_hash,
           must_change_password
         ) VALUES(?, ?, ?, ?, ?, ?, 1)",
        (first_name, surname, &full_name, email, role, &hashed),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }
    let user_id = conn.last_insert_rowid();

    let sql = format!("{} WHERE id = ?", USER_SELECT);
    match conn.query_row(&sql, [user_id], user_row_to_json).optional() {
        Ok(Some(user)) => ok(&req.id, json!({ "user": user })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load created user", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(user_id) = req.params.get("user_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing user_id", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let row = match conn
        .query_row(
            "SELECT
               first_name,
               surname,
               full_name,
               email,
               role,
               must_change_password,
               password_hash
             FROM users
             WHERE id = ?",
            [user_id],
            |row| {
                let current = merge::row_to_json(row, USER_FIELDS)?;
                let password_hash: String = row.get("password_hash")?;
                Ok((current, password_hash))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((current, current_hash)) = row else {
        return err(&req.id, "not_found", "user not found", None);
    };

    let mut merged = match merge::merge_patch(&current, patch, USER_FIELDS) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };

    if let Some(full_name) = merge::recomputed_full_name(patch, &merged) {
        merged.insert("full_name".to_string(), json!(full_name));
    }

    let password_hash = match patch.get("password").and_then(|v| v.as_str()) {
        Some(p) if !p.is_empty() => security::hash_password(p),
        _ => current_hash,
    };

    let mut params = match merge::update_params(&merged, USER_FIELDS) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };
    params.push(rusqlite::types::Value::Text(password_hash));
    params.push(rusqlite::types::Value::Integer(user_id));

    let update = merge::update_sql("users", USER_FIELDS, &["password_hash"]);
    if let Err(e) = conn.execute(&update, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    let sql = format!("{} WHERE id = ?", USER_SELECT);
    match conn.query_row(&sql, [user_id], user_row_to_json).optional() {
        Ok(Some(user)) => ok(&req.id, json!({ "user": user })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load updated user", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.update" => Some(handle_users_update(state, req)),
        _ => None,
    }
}

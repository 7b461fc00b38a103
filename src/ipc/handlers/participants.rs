use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::merge::{self, FieldKind, FieldSpec, MergeRule};

// Unlike templates and users, every participant field updates whenever it is
// supplied, so empty strings DO blank these columns.
const PARTICIPANT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: "first_name",
        column: "first_name",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "surname",
        column: "surname",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "contact_number",
        column: "contact_number",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
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
        field: "payment_status",
        column: "payment_status",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "joining_sent",
        column: "joining_sent",
        kind: FieldKind::Flag,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "notes",
        column: "notes",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
];

const PARTICIPANT_SELECT: &str = "SELECT
       id,
       course_id,
       first_name,
       surname,
       contact_number,
       email,
       payment_status,
       joining_sent,
       notes
     FROM participants";

fn participant_row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get("id")?;
    let course_id: i64 = row.get("course_id")?;
    let mut map = merge::row_to_json(row, PARTICIPANT_FIELDS)?;
    map.insert("id".to_string(), json!(id));
    map.insert("course_id".to_string(), json!(course_id));
    Ok(serde_json::Value::Object(map))
}

fn handle_participants_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("course_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing course_id", None);
    };

    let sql = format!(
        "{} WHERE course_id = ? ORDER BY surname, first_name",
        PARTICIPANT_SELECT
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([course_id], participant_row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(participants) => ok(&req.id, json!({ "participants": participants })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_participants_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("course_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing course_id", None);
    };
    let Some(first_name) = req.params.get("first_name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing first_name", None);
    };
    let Some(surname) = req.params.get("surname").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing surname", None);
    };

    let contact_number = req.params.get("contact_number").and_then(|v| v.as_str());
    let email = req.params.get("email").and_then(|v| v.as_str());
    let payment_status = req.params.get("payment_status").and_then(|v| v.as_str());
    let notes = req.params.get("notes").and_then(|v| v.as_str());
    let joining_sent = req
        .params
        .get("joining_sent")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let course_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if course_exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO participants(
           course_id,
           first_name,
           surname,
           contact_number,
           email,
           payment_status,
           joining_sent,
           notes
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            course_id,
            first_name,
            surname,
            contact_number,
            email,
            payment_status,
            if joining_sent { 1 } else { 0 },
            notes,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "participants" })),
        );
    }
    let participant_id = conn.last_insert_rowid();

    let sql = format!("{} WHERE id = ?", PARTICIPANT_SELECT);
    match conn
        .query_row(&sql, [participant_id], participant_row_to_json)
        .optional()
    {
        Ok(Some(participant)) => ok(&req.id, json!({ "participant": participant })),
        Ok(None) => err(
            &req.id,
            "reread_failed",
            "failed to load created participant",
            None,
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_participants_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(participant_id) = req.params.get("participant_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing participant_id", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let sql = format!("{} WHERE id = ?", PARTICIPANT_SELECT);
    let current = match conn
        .query_row(&sql, [participant_id], |row| {
            merge::row_to_json(row, PARTICIPANT_FIELDS)
        })
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "participant not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = match merge::merge_patch(&current, patch, PARTICIPANT_FIELDS) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };

    let mut params = match merge::update_params(&merged, PARTICIPANT_FIELDS) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };
    params.push(rusqlite::types::Value::Integer(participant_id));

    let update = merge::update_sql("participants", PARTICIPANT_FIELDS, &[]);
    if let Err(e) = conn.execute(&update, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "participants" })),
        );
    }

    let sql = format!("{} WHERE id = ?", PARTICIPANT_SELECT);
    match conn
        .query_row(&sql, [participant_id], participant_row_to_json)
        .optional()
    {
        Ok(Some(participant)) => ok(&req.id, json!({ "participant": participant })),
        Ok(None) => err(
            &req.id,
            "reread_failed",
            "failed to load updated participant",
            None,
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_participants_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(participant_id) = req.params.get("participant_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing participant_id", None);
    };

    match conn.execute("DELETE FROM participants WHERE id = ?", [participant_id]) {
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "participants" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "participants.list" => Some(handle_participants_list(state, req)),
        "participants.create" => Some(handle_participants_create(state, req)),
        "participants.update" => Some(handle_participants_update(state, req)),
        "participants.delete" => Some(handle_participants_delete(state, req)),
        _ => None,
    }
}

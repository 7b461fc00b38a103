use rusqlite::{params_from_iter, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::merge::{self, FieldKind, FieldSpec, MergeRule};

// default_title predates course_title; reads fall back to it and writes keep
// both columns aligned so the desktop app sees the same value.
const TEMPLATE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: "name",
        column: "name",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "course_type",
        column: "course_type",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "course_title",
        column: "course_title",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: Some("default_title"),
        mirror: Some("default_title"),
    },
    FieldSpec {
        field: "provider_type",
        column: "provider_type",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "default_capacity",
        column: "default_capacity",
        kind: FieldKind::Integer,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "validity_months",
        column: "validity_months",
        kind: FieldKind::Integer,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "cpd_hours",
        column: "cpd_hours",
        kind: FieldKind::Real,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "default_trainer",
        column: "default_trainer",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "default_venue_id",
        column: "default_venue_id",
        kind: FieldKind::Integer,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
];

const TEMPLATE_SELECT: &str = "SELECT
       id,
       name,
       course_type,
       default_title,
       default_venue_id,
       default_trainer,
       default_capacity,
       course_title,
       provider_type,
       validity_months,
       cpd_hours
     FROM course_templates";

fn template_row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get("id")?;
    let mut map = merge::row_to_json(row, TEMPLATE_FIELDS)?;
    map.insert("id".to_string(), json!(id));
    Ok(serde_json::Value::Object(map))
}

fn handle_templates_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let sql = format!("{} ORDER BY name ASC", TEMPLATE_SELECT);
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], template_row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(templates) => ok(&req.id, json!({ "templates": templates })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_templates_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let course_type = req.params.get("course_type").and_then(|v| v.as_str());
    let course_title = req.params.get("course_title").and_then(|v| v.as_str());
    let provider_type = req.params.get("provider_type").and_then(|v| v.as_str());
    let default_capacity = req.params.get("default_capacity").and_then(|v| v.as_i64());
    let validity_months = req.params.get("validity_months").and_then(|v| v.as_i64());
    let cpd_hours = req.params.get("cpd_hours").and_then(|v| v.as_f64());
    let default_trainer = req.params.get("default_trainer").and_then(|v| v.as_str());
    let default_venue_id = req.params.get("default_venue_id").and_then(|v| v.as_i64());

    if let Err(e) = conn.execute(
        "INSERT INTO course_templates(
           name,
           course_type,
           default_title,
           default_venue_id,
           default_trainer,
           default_capacity,
           course_title,
           provider_type,
           validity_months,
           cpd_hours
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &name,
            course_type,
            course_title,
            default_venue_id,
            default_trainer,
            default_capacity,
            course_title,
            provider_type,
            validity_months,
            cpd_hours,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "course_templates" })),
        );
    }
    let template_id = conn.last_insert_rowid();

    let sql = format!("{} WHERE id = ?", TEMPLATE_SELECT);
    match conn.query_row(&sql, [template_id], template_row_to_json).optional() {
        Ok(Some(template)) => ok(&req.id, json!({ "template": template })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load created template", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_templates_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(template_id) = req.params.get("template_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing template_id", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let sql = format!("{} WHERE id = ?", TEMPLATE_SELECT);
    let current = match conn
        .query_row(&sql, [template_id], |row| {
            merge::row_to_json(row, TEMPLATE_FIELDS)
        })
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "template not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = match merge::merge_patch(&current, patch, TEMPLATE_FIELDS) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };

    let mut params = match merge::update_params(&merged, TEMPLATE_FIELDS) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };
    params.push(rusqlite::types::Value::Integer(template_id));

    let update = merge::update_sql("course_templates", TEMPLATE_FIELDS, &[]);
    if let Err(e) = conn.execute(&update, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "course_templates" })),
        );
    }

    let sql = format!("{} WHERE id = ?", TEMPLATE_SELECT);
    match conn.query_row(&sql, [template_id], template_row_to_json).optional() {
        Ok(Some(template)) => ok(&req.id, json!({ "template": template })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load updated template", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.list" => Some(handle_templates_list(state, req)),
        "templates.create" => Some(handle_templates_create(state, req)),
        "templates.update" => Some(handle_templates_update(state, req)),
        _ => None,
    }
}

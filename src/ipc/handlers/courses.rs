use chrono::{Datelike, NaiveDate};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::merge::{self, FieldKind, FieldSpec, MergeRule};
use crate::refcode;

// Patchable course columns. The ref and the title are fixed at creation:
// renaming a template later never rewrites the courses already cut from it.
const COURSE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        field: "course_date",
        column: "course_date",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "trainer",
        column: "trainer",
        kind: FieldKind::Text,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "venue_id",
        column: "venue_id",
        kind: FieldKind::Integer,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "capacity",
        column: "capacity",
        kind: FieldKind::Integer,
        rule: MergeRule::Explicit,
        read_fallback: None,
        mirror: None,
    },
    FieldSpec {
        field: "status",
        column: "status",
        kind: FieldKind::Text,
        rule: MergeRule::NonEmptyText,
        read_fallback: None,
        mirror: None,
    },
];

// The record shape the frontend expects: joined to venues, blanks coalesced.
const COURSE_SELECT: &str = "SELECT
       c.id,
       c.course_title AS title,
       c.course_ref AS code,
       c.course_date AS start_date,
       c.course_date AS end_date,
       COALESCE(c.trainer, '') AS trainer_name,
       COALESCE(v.name, '') AS venue_name,
       COALESCE(c.status, 'Planned') AS status
     FROM courses c
     LEFT JOIN venues v ON v.id = c.venue_id";

fn course_row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get("id")?;
    let title: Option<String> = row.get("title")?;
    let code: String = row.get("code")?;
    let start_date: String = row.get("start_date")?;
    let end_date: Option<String> = row.get("end_date")?;
    let trainer_name: String = row.get("trainer_name")?;
    let venue_name: String = row.get("venue_name")?;
    let status: String = row.get("status")?;
    Ok(json!({
        "id": id,
        "title": title,
        "code": code,
        "start_date": start_date,
        "end_date": end_date,
        "trainer_name": trainer_name,
        "venue_name": venue_name,
        "status": status
    }))
}

fn read_course(conn: &Connection, course_id: i64) -> rusqlite::Result<Option<serde_json::Value>> {
    let sql = format!("{} WHERE c.id = ?", COURSE_SELECT);
    conn.query_row(&sql, [course_id], course_row_to_json).optional()
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let sql = format!("{} ORDER BY c.course_date DESC, c.id DESC", COURSE_SELECT);
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], course_row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("course_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing course_id", None);
    };

    match read_course(conn, course_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(template_id) = req.params.get("template_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing template_id", None);
    };
    let Some(date_raw) = req.params.get("course_date").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing course_date", None);
    };
    let course_date = match NaiveDate::parse_from_str(date_raw, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => {
            return err(
                &req.id,
                "bad_params",
                "course_date must be an ISO date (YYYY-MM-DD)",
                None,
            )
        }
    };
    let venue_id = req.params.get("venue_id").and_then(|v| v.as_i64());
    let trainer = req
        .params
        .get("trainer")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let capacity_req = req.params.get("capacity").and_then(|v| v.as_i64());
    let status_req = req.params.get("status").and_then(|v| v.as_str());

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let tmpl: Option<(String, Option<String>, Option<i64>)> = match tx
        .query_row(
            "SELECT name, course_title, default_capacity FROM course_templates WHERE id = ?",
            [template_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((template_name, tmpl_title, tmpl_capacity)) = tmpl else {
        return err(&req.id, "not_found", "template not found", None);
    };

    // The course title snapshots the template at creation time; default_title
    // is a template-read fallback only and never reaches this layer.
    let course_title = tmpl_title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| template_name.clone());
    let default_capacity = match tmpl_capacity {
        Some(c) if c != 0 => c,
        _ => 12,
    };
    let capacity = match capacity_req {
        Some(c) if c > 0 => c,
        _ => default_capacity,
    };
    let status = match status_req {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "Planned".to_string(),
    };

    let year = course_date.year();
    let short_name = refcode::template_short_name(&template_name);
    let course_date_str = course_date.format("%Y-%m-%d").to_string();

    // Scan-then-insert leaves a race window; the unique index on course_ref
    // catches the loser, which re-scans and re-allocates once.
    let mut new_id: Option<i64> = None;
    let mut course_ref = String::new();
    for _ in 0..2 {
        let refs: Vec<String> = {
            let mut stmt = match tx.prepare(
                "SELECT course_ref FROM courses WHERE template_id = ?1 AND course_ref LIKE ?2",
            ) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let collected = stmt
                .query_map(
                    (template_id, format!("%-{}-%", year)),
                    |row| row.get::<_, String>(0),
                )
                .and_then(|it| it.collect::<Result<Vec<_>, _>>());
            match collected {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        };

        let cohort = refcode::next_cohort_number(&refs, year);
        course_ref = refcode::course_ref(&short_name, year, cohort);

        match tx.execute(
            "INSERT INTO courses(
               course_ref,
               course_date,
               template_id,
               course_title,
               trainer,
               venue_id,
               capacity,
               status
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &course_ref,
                &course_date_str,
                template_id,
                &course_title,
                &trainer,
                venue_id,
                capacity,
                &status,
            ),
        ) {
            Ok(_) => {
                new_id = Some(tx.last_insert_rowid());
                break;
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(course_ref = %course_ref, "ref taken, reallocating");
                continue;
            }
            Err(e) => {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "courses" })),
                )
            }
        }
    }
    let Some(new_id) = new_id else {
        return err(
            &req.id,
            "course_ref_conflict",
            format!("course ref {} already allocated", course_ref),
            None,
        );
    };

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    match read_course(conn, new_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load created course", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("course_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing course_id", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };

    let current = match conn
        .query_row(
            "SELECT course_date, trainer, venue_id, capacity, status FROM courses WHERE id = ?",
            [course_id],
            |row| merge::row_to_json(row, COURSE_FIELDS),
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = match merge::merge_patch(&current, patch, COURSE_FIELDS) {
        Ok(m) => m,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };

    if let Some(date) = merged.get("course_date").and_then(|v| v.as_str()) {
        if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return err(
                &req.id,
                "bad_params",
                "course_date must be an ISO date (YYYY-MM-DD)",
                None,
            );
        }
    }

    let mut params = match merge::update_params(&merged, COURSE_FIELDS) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "bad_params", e.message(), None),
    };
    params.push(rusqlite::types::Value::Integer(course_id));

    let sql = merge::update_sql("courses", COURSE_FIELDS, &[]);
    if let Err(e) = conn.execute(&sql, params_from_iter(params)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    match read_course(conn, course_id) {
        Ok(Some(course)) => ok(&req.id, json!({ "course": course })),
        Ok(None) => err(&req.id, "reread_failed", "failed to load updated course", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.update" => Some(handle_courses_update(state, req)),
        _ => None,
    }
}

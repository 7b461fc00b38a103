use rusqlite::OptionalExtension;
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

const VENUE_SELECT: &str = "SELECT id, name, address1, address2, city, postcode FROM venues";

fn venue_row_to_json(row: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get("id")?;
    let name: String = row.get("name")?;
    let address1: Option<String> = row.get("address1")?;
    let address2: Option<String> = row.get("address2")?;
    let city: Option<String> = row.get("city")?;
    let postcode: Option<String> = row.get("postcode")?;
    Ok(json!({
        "id": id,
        "name": name,
        "address1": address1,
        "address2": address2,
        "city": city,
        "postcode": postcode
    }))
}

fn handle_venues_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let sql = format!("{} ORDER BY name ASC", VENUE_SELECT);
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], venue_row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(venues) => ok(&req.id, json!({ "venues": venues })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_venues_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(venue_id) = req.params.get("venue_id").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing venue_id", None);
    };

    let sql = format!("{} WHERE id = ?", VENUE_SELECT);
    match conn.query_row(&sql, [venue_id], venue_row_to_json).optional() {
        Ok(Some(venue)) => ok(&req.id, json!({ "venue": venue })),
        Ok(None) => err(&req.id, "not_found", "venue not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "venues.list" => Some(handle_venues_list(state, req)),
        "venues.get" => Some(handle_venues_get(state, req)),
        _ => None,
    }
}

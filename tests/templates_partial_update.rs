
use rusqlite::Connection;
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn string_fields_ignore_blanks_numeric_fields_take_zero() {
    let workspace = temp_dir("trainstream-template-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "templates.create",
        json!({
            "name": "FREC 3",
            "course_type": "First Aid",
            "course_title": "FREC Level 3",
            "default_capacity": 12,
            "validity_months": 36,
            "cpd_hours": 6.0
        }),
    );
    let template_id = created
        .pointer("/template/id")
        .and_then(|v| v.as_i64())
        .expect("template id");

    // A blank name is treated like an absent one; the stored name survives.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "templates.update",
        json!({ "template_id": template_id, "patch": { "name": "" } }),
    );
    assert_eq!(
        updated.pointer("/template/name").and_then(|v| v.as_str()),
        Some("FREC 3")
    );

    // Zero is a deliberate value for numeric fields and must stick.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "templates.update",
        json!({ "template_id": template_id, "patch": { "default_capacity": 0 } }),
    );
    assert_eq!(
        updated
            .pointer("/template/default_capacity")
            .and_then(|v| v.as_i64()),
        Some(0)
    );

    // Nulls and absent fields keep current values.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "templates.update",
        json!({ "template_id": template_id, "patch": { "cpd_hours": null } }),
    );
    assert_eq!(
        updated.pointer("/template/cpd_hours").and_then(|v| v.as_f64()),
        Some(6.0)
    );
    assert_eq!(
        updated
            .pointer("/template/validity_months")
            .and_then(|v| v.as_i64()),
        Some(36)
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "templates.update",
        json!({ "template_id": 777, "patch": { "name": "X" } }),
    );
    assert_eq!(missing.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&missing), "not_found");

    let bad = request(
        &mut stdin,
        &mut reader,
        "7",
        "templates.update",
        json!({ "template_id": template_id, "patch": { "default_capacity": "ten" } }),
    );
    assert_eq!(error_code(&bad), "bad_params");
}

#[test]
fn course_title_mirrors_into_the_legacy_column_and_reads_fall_back() {
    let workspace = temp_dir("trainstream-template-title");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "templates.create",
        json!({ "name": "EFAW", "course_title": "Emergency First Aid at Work" }),
    );
    let template_id = created
        .pointer("/template/id")
        .and_then(|v| v.as_i64())
        .expect("template id");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "templates.update",
        json!({ "template_id": template_id, "patch": { "course_title": "EFAW (RQF)" } }),
    );
    assert_eq!(
        updated
            .pointer("/template/course_title")
            .and_then(|v| v.as_str()),
        Some("EFAW (RQF)")
    );

    let conn = Connection::open(workspace.join("trainstream.db")).expect("open db");
    let default_title: String = conn
        .query_row(
            "SELECT default_title FROM course_templates WHERE id = ?",
            [template_id],
            |r| r.get(0),
        )
        .expect("default_title");
    assert_eq!(default_title, "EFAW (RQF)");

    // Rows that only ever had default_title still present a title.
    conn.execute(
        "INSERT INTO course_templates(name, default_title) VALUES('Legacy Course', 'Old Title')",
        [],
    )
    .expect("seed legacy template");

    let listed = request_ok(&mut stdin, &mut reader, "4", "templates.list", json!({}));
    let templates = listed
        .get("templates")
        .and_then(|v| v.as_array())
        .expect("templates array");
    let legacy = templates
        .iter()
        .find(|t| t.get("name").and_then(|v| v.as_str()) == Some("Legacy Course"))
        .expect("legacy row listed");
    assert_eq!(
        legacy.get("course_title").and_then(|v| v.as_str()),
        Some("Old Title")
    );
}

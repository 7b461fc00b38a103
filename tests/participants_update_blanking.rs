
use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn seed_course(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> i64 {
    let tmpl = request_ok(
        stdin,
        reader,
        "t1",
        "templates.create",
        json!({ "name": "FAW" }),
    );
    let template_id = tmpl.pointer("/template/id").and_then(|v| v.as_i64()).unwrap();
    let course = request_ok(
        stdin,
        reader,
        "t2",
        "courses.create",
        json!({ "template_id": template_id, "course_date": "2024-06-10" }),
    );
    course.pointer("/course/id").and_then(|v| v.as_i64()).unwrap()
}

#[test]
fn every_participant_field_updates_when_supplied_including_blanks() {
    let workspace = temp_dir("trainstream-participant-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = seed_course(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "participants.create",
        json!({
            "course_id": course_id,
            "first_name": "Amy",
            "surname": "Jones",
            "contact_number": "07700 900123",
            "email": "amy@example.com",
            "payment_status": "Paid",
            "joining_sent": true,
            "notes": "dietary: none"
        }),
    );
    let participant_id = created
        .pointer("/participant/id")
        .and_then(|v| v.as_i64())
        .expect("participant id");

    // Participants merge every supplied value, so an empty string really
    // blanks the column and false really clears the flag.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "participants.update",
        json!({
            "participant_id": participant_id,
            "patch": { "contact_number": "", "joining_sent": false }
        }),
    );
    assert_eq!(
        updated
            .pointer("/participant/contact_number")
            .and_then(|v| v.as_str()),
        Some("")
    );
    assert_eq!(
        updated
            .pointer("/participant/joining_sent")
            .and_then(|v| v.as_bool()),
        Some(false)
    );
    // Untouched fields survive.
    assert_eq!(
        updated
            .pointer("/participant/surname")
            .and_then(|v| v.as_str()),
        Some("Jones")
    );
    assert_eq!(
        updated
            .pointer("/participant/payment_status")
            .and_then(|v| v.as_str()),
        Some("Paid")
    );

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "participants.update",
        json!({ "participant_id": participant_id, "patch": { "surname": "Smith" } }),
    );
    assert_eq!(
        renamed
            .pointer("/participant/surname")
            .and_then(|v| v.as_str()),
        Some("Smith")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "participants.delete",
        json!({ "participant_id": participant_id }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "participants.list",
        json!({ "course_id": course_id }),
    );
    assert_eq!(
        listed
            .get("participants")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn listing_orders_by_surname_then_first_name() {
    let workspace = temp_dir("trainstream-participant-order");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course_id = seed_course(&mut stdin, &mut reader);

    for (i, (first, last)) in [("Zoe", "Adams"), ("Ben", "Carter"), ("Al", "Carter")]
        .iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "participants.create",
            json!({ "course_id": course_id, "first_name": first, "surname": last }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "participants.list",
        json!({ "course_id": course_id }),
    );
    let names: Vec<String> = listed
        .get("participants")
        .and_then(|v| v.as_array())
        .expect("participants")
        .iter()
        .map(|p| {
            format!(
                "{} {}",
                p.get("first_name").and_then(|v| v.as_str()).unwrap_or(""),
                p.get("surname").and_then(|v| v.as_str()).unwrap_or("")
            )
        })
        .collect();
    assert_eq!(names, vec!["Zoe Adams", "Al Carter", "Ben Carter"]);
}


use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar};

#[test]
fn dev_credentials_yield_a_bearer_token() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Login works before any workspace is selected; it never touches the db.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "username": "ross", "password": "trainstream" }),
    );

    assert_eq!(
        result.get("token_type").and_then(|v| v.as_str()),
        Some("bearer")
    );
    assert_eq!(result.get("username").and_then(|v| v.as_str()), Some("ross"));

    let token = result
        .get("access_token")
        .and_then(|v| v.as_str())
        .expect("access_token");
    assert_eq!(token.split('.').count(), 3, "expected a JWT, got {token}");
}

#[test]
fn wrong_credentials_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "auth.login",
        json!({ "username": "ross", "password": "nope" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "invalid_credentials");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.login",
        json!({ "username": "ross" }),
    );
    assert_eq!(error_code(&resp), "bad_params");
}

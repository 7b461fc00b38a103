use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::security;
use serde_json::json;

// Single dev credential pair until real account login lands; data methods do
// not check the issued token.
const DEV_USERNAME: &str = "ross";
const DEV_PASSWORD: &str = "trainstream";

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let username = match req.params.get("username").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing username", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing password", None),
    };

    if !(username == DEV_USERNAME && password == DEV_PASSWORD) {
        return err(&req.id, "invalid_credentials", "invalid credentials", None);
    }

    let token = match security::create_access_token(
        &username,
        state.settings.access_token_expire_minutes,
        &state.settings.secret_key,
    ) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "token_sign_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "access_token": token,
            "token_type": "bearer",
            "username": username
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        _ => None,
    }
}

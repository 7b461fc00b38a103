/// Runtime settings for the auth collaborator, overridable via environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
}

impl Settings {
    pub fn from_env() -> Self {
        let secret_key = std::env::var("TRAINSTREAM_SECRET_KEY")
            .unwrap_or_else(|_| "dev-secret-key-change-later".to_string());
        let access_token_expire_minutes = std::env::var("TRAINSTREAM_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(60);

        Settings {
            secret_key,
            access_token_expire_minutes,
        }
    }
}

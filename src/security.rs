use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Sign a short-lived HS256 access token for the given subject.
pub fn create_access_token(
    subject: &str,
    expires_minutes: i64,
    secret_key: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (Utc::now() + Duration::minutes(expires_minutes)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )
}

/// PBKDF2-SHA256 password hash in the `salt_hex:digest_hex` layout the
/// desktop app already writes, so both programs can verify each other's rows.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut digest = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ROUNDS, &mut digest);

    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_layout_is_salt_colon_digest() {
        let hashed = hash_password("trainstream");
        let (salt, digest) = hashed.split_once(':').expect("colon separator");
        assert_eq!(salt.len(), SALT_LEN * 2);
        assert_eq!(digest.len(), 64);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hashes_are_salted_per_call() {
        assert_ne!(hash_password("x"), hash_password("x"));
    }

    #[test]
    fn tokens_have_three_segments() {
        let token = create_access_token("ross", 60, "dev-secret-key-change-later").expect("sign");
        assert_eq!(token.split('.').count(), 3);
    }
}

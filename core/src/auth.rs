use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// JWT payload for access tokens. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Issue an HS256 access token for a user, valid for `ttl_days`.
pub fn issue_token(user_id: Uuid, secret: &str, ttl_days: i64) -> Result<String, String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("Failed to sign access token: {e}"))
}

/// Verify an access token and return the user id it was issued for.
/// Returns `None` for expired, malformed, or wrongly-signed tokens.
pub fn verify_token(token: &str, secret: &str) -> Option<Uuid> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()
    .map(|data| data.claims.sub)
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed = PasswordHash::new(hash).map_err(|e| format!("Invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// SHA-256 hex digest of an arbitrary string. Used as a stable cache key
/// for downloaded OpenAPI specs.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a `Basic` authorization header value from a username and password.
pub fn basic_auth_value(username: &str, password: &str) -> String {
    use base64::Engine;
    let credentials =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {credentials}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_roundtrip() {
        let user_id = Uuid::now_v7();
        let token = issue_token(user_id, SECRET, 7).unwrap();
        assert_eq!(verify_token(&token, SECRET), Some(user_id));
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = issue_token(Uuid::now_v7(), SECRET, 7).unwrap();
        assert_eq!(verify_token(&token, "other-secret"), None);
    }

    #[test]
    fn expired_token_rejected() {
        let token = issue_token(Uuid::now_v7(), SECRET, -1).unwrap();
        assert_eq!(verify_token(&token, SECRET), None);
    }

    #[test]
    fn garbage_token_rejected() {
        assert_eq!(verify_token("not-a-jwt", SECRET), None);
    }

    #[test]
    fn password_roundtrip() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("https://example.com/openapi.json"),
            sha256_hex("https://example.com/openapi.json")
        );
        assert_ne!(sha256_hex("a"), sha256_hex("b"));
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        assert_eq!(basic_auth_value("user", "pass"), "Basic dXNlcjpwYXNz");
    }
}

//! Bearer tokens for the user-facing API.
//!
//! HS256 JWTs carrying the user id; seven-day expiry, issuer `DHB`.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

const ISSUER: &str = "DHB";
const TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 24 * 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub user_type: String,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
}

/// Issue a bearer token for a user.
pub fn create_token(user_id: i64, secret: &str) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        user_id,
        user_type: "user".to_string(),
        nbf: now,
        exp: now + TOKEN_LIFETIME_SECS,
        iss: ISSUER.to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Fatal(format!("token signing failed: {e}")))
}

/// Verify a bearer token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Forbidden("missing or expired bearer token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let token = create_token(42, "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.user_type, "user");
        assert_eq!(claims.iss, "DHB");
        assert_eq!(claims.exp - claims.nbf, 60 * 60 * 24 * 7);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token(42, "secret").unwrap();
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verify_token("not-a-token", "secret").is_err());
    }
}

//! Bearer token issue and verification (HS256 JWT).

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub exp: i64,
}

/// Sign a token for `user_id` valid for `ttl`.
pub fn issue(
    secret: &str,
    user_id: &str,
    username: &str,
    ttl: chrono::Duration,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(?e, "token signing failed");
        ApiError::internal("Could not issue token")
    })
}

/// Verify signature and expiry, returning the claims.
pub fn verify(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(?e, "token validation failed");
        ApiError::unauthorized("Invalid or expired token")
    })
}

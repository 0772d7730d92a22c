use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::models::Role;
use crate::error::{AppError, AppResult};

/// Bearer token payload. `sub` is the user id; role travels with the token
/// so admin gating never needs a database round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

pub fn issue(user_id: &str, role: Role, secret: &str, days: i64) -> AppResult<String> {
    let exp = Utc::now() + Duration::days(days);
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
}

/// Verify signature and expiry. There is no revocation list: a token stays
/// valid until its expiry regardless of server-side state changes.
pub fn verify(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid token".into()))
}

//! JWT issuance and the extractor guarding authenticated routes.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::{Role, User},
    state::AppState,
};

const TOKEN_TTL_HOURS: i64 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

pub fn issue_token(user: &User, secret: &str) -> Result<String, AppError> {
    let claims = Claims {
        user_id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token"))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Extractor for routes behind auth; rejects with 401 when the bearer
/// token is missing or does not verify.
pub struct AuthUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized("Missing authorization token"))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User::new(
            "reader".to_string(),
            "reader@example.com".to_string(),
            "hash".to_string(),
            Role::User,
        )
    }

    #[test]
    fn token_round_trip_carries_the_claims() {
        let user = sample_user();
        let token = issue_token(&user, "secret").unwrap();

        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.username, "reader");
        assert_eq!(claims.email, "reader@example.com");
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&sample_user(), "secret").unwrap();
        assert!(decode_token(&token, "other-secret").is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("Sup3r$ecret").unwrap();
        assert!(verify_password("Sup3r$ecret", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}

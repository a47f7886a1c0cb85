//! User accounts: registration, login, profile, and password reset.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{self, AuthUser},
    database,
    error::AppError,
    mailer::{password_reset_html, valid_email},
    models::{Role, User},
    state::AppState,
};

/// At least 8 characters with an uppercase letter, a lowercase letter, a
/// digit, and a special character.
pub fn acceptable_password(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric())
}

fn check_password(password: &str) -> Result<(), AppError> {
    if !acceptable_password(password) {
        return Err(AppError::Validation(
            "Password must be at least 8 characters and contain an uppercase letter, \
             a lowercase letter, a number, and a special character"
                .to_string(),
        ));
    }

    Ok(())
}

#[derive(Deserialize)]
pub struct Register {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Register>,
) -> Result<impl IntoResponse, AppError> {
    let username = payload.username.trim();

    if username.is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }
    if !valid_email(&payload.email) {
        return Err(AppError::Validation("Invalid email".to_string()));
    }
    check_password(&payload.password)?;

    let mut conn = state.redis.clone();

    if database::email_taken(&mut conn, &payload.email).await? {
        return Err(AppError::Validation("Email already exists".to_string()));
    }

    let user = User::new(
        username.to_string(),
        payload.email,
        auth::hash_password(&payload.password)?,
        payload.role.unwrap_or(Role::User),
    );

    database::insert_user(&mut conn, &user).await?;

    Ok((StatusCode::CREATED, Json(user.public())))
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Login>,
) -> Result<impl IntoResponse, AppError> {
    info!("Login attempt for email: {}", payload.email);

    let mut conn = state.redis.clone();

    let user = database::find_user_by_email(&mut conn, &payload.email)
        .await?
        .filter(|user| auth::verify_password(&payload.password, &user.password))
        .ok_or_else(|| {
            warn!("Login failed for email: {}", payload.email);
            AppError::Unauthorized("Invalid email or password")
        })?;

    info!("Login successful for email: {}", payload.email);

    let token = auth::issue_token(&user, &state.config.jwt_secret)?;

    Ok(Json(json!({ "token": token })))
}

pub async fn profile(
    AuthUser(claims): AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let user = database::find_user(&mut conn, &claims.user_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    Ok(Json(user.public()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub profile_photo_url: Option<String>,
}

pub async fn update_profile(
    AuthUser(claims): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProfile>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let mut user = database::find_user(&mut conn, &claims.user_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    if let Some(username) = payload.username {
        user.username = username;
    }
    if let Some(email) = payload.email {
        if !valid_email(&email) {
            return Err(AppError::Validation("Invalid email".to_string()));
        }
        if email != user.email {
            database::reindex_user_email(&mut conn, &user.email, &email, &user.id).await?;
            user.email = email;
        }
    }
    if let Some(role) = payload.role {
        user.role = role;
    }
    if let Some(url) = payload.profile_photo_url {
        user.profile_photo_url = Some(url);
    }

    database::replace_user(&mut conn, &user).await?;

    Ok(Json(user.public()))
}

#[derive(Deserialize)]
pub struct ForgotPassword {
    pub email: String,
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPassword>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = state.redis.clone();

    let user = database::find_user_by_email(&mut conn, &payload.email)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    let token = Uuid::new_v4().simple().to_string();
    database::put_reset_token(&mut conn, &token, &user.id).await?;

    let reset_url = format!("{}/reset-password/{token}", state.config.frontend_url);

    state
        .mailer
        .send(
            &user.email,
            "Password Reset Request",
            password_reset_html(&reset_url),
        )
        .await
        .map_err(|e| {
            warn!("Password reset email for {} not sent: {e}", user.id);
            AppError::Email("password reset")
        })?;

    Ok(Json(json!({ "message": "Password reset email sent" })))
}

#[derive(Deserialize)]
pub struct ResetPassword {
    pub password: String,
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPassword>,
) -> Result<impl IntoResponse, AppError> {
    check_password(&payload.password)?;

    let mut conn = state.redis.clone();

    let user = match database::take_reset_token(&mut conn, &token).await? {
        Some(user_id) => database::find_user(&mut conn, &user_id).await?,
        None => None,
    };

    let mut user =
        user.ok_or_else(|| AppError::Validation("Invalid or expired token".to_string()))?;

    user.password = auth::hash_password(&payload.password)?;
    database::replace_user(&mut conn, &user).await?;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_conforming_password() {
        assert!(acceptable_password("Sup3r$ecret"));
    }

    #[test]
    fn rejects_weak_passwords() {
        assert!(!acceptable_password("short1$"));
        assert!(!acceptable_password("alllowercase1$"));
        assert!(!acceptable_password("ALLUPPERCASE1$"));
        assert!(!acceptable_password("NoDigitsHere$"));
        assert!(!acceptable_password("NoSpecials123"));
    }
}

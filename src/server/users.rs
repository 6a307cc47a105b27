use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::auth::jwt::issue_token;
use crate::cache::{self, Partition, USER_EXISTS_TTL};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, RegisterRequest};
use crate::server::response::{ApiError, created, ok};
use crate::server::validation::{validate_password, validate_username};
use crate::types::User;

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };
    validate_username(&username)?;
    validate_password(&password)?;

    if state.store.find_user(&username).await?.is_some() {
        return Err(ApiError::conflict("Username already taken"));
    }

    let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal(format!("failed to hash password: {e}")))?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        email: req.email,
        phone: req.phone,
        password_hash,
        created_at: Utc::now(),
        last_login: None,
    };
    let user = state.store.create_user(&user).await?;
    state.cache.clear_user(&user.username);

    let token = issue_token(&state.config.jwt_secret, &user.id, &user.username)
        .map_err(ApiError::from)?;

    tracing::info!("registered user {}", user.username);
    Ok(created(json!({
        "message": "User registered successfully",
        "user": user,
        "token": token,
    })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return Err(ApiError::bad_request("Username and password are required"));
    };

    // Unknown user and bad password answer identically.
    let user = state
        .store
        .find_user(&username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    let matches = bcrypt::verify(&password, &user.password_hash)
        .map_err(|e| ApiError::internal(format!("failed to verify password: {e}")))?;
    if !matches {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    // Best effort; a failed stamp must not block the login.
    if let Err(e) = state.store.touch_last_login(&user.username).await {
        tracing::warn!("failed to stamp last_login for {}: {e}", user.username);
    }
    state.cache.clear_user(&user.username);

    let token = issue_token(&state.config.jwt_secret, &user.id, &user.username)
        .map_err(ApiError::from)?;

    Ok(ok(json!({ "user": user, "token": token })))
}

/// Existence probe used by the registration form. Cached aggressively and
/// invalidated when the name gets registered.
pub async fn check_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key = cache::user_exists_key(&username);
    if let Some(cached) = state.cache.get(Partition::User, &key) {
        return Ok(ok(json!({ "exists": cached, "username": username, "cached": true })));
    }

    let exists = state.store.find_user(&username).await?.is_some();
    state
        .cache
        .set(Partition::User, &key, json!(exists), USER_EXISTS_TTL);

    Ok(ok(json!({ "exists": exists, "username": username })))
}

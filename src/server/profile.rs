use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireAuth;
use crate::cache::{self, Partition, USER_TTL};
use crate::server::AppState;
use crate::server::dto::ProfileUpdateRequest;
use crate::server::response::{ApiError, ok};
use crate::types::Profile;

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key = cache::user_key(&username);
    if let Some(cached) = state.cache.get(Partition::User, &key) {
        if cached.is_null() {
            return Err(ApiError::not_found("Profile not found"));
        }
        return Ok(ok(json!({ "record": cached })));
    }

    let profile = state.store.get_profile(&username).await?;
    state.cache.set(
        Partition::User,
        &key,
        serde_json::to_value(&profile).map_err(crate::error::Error::from)?,
        USER_TTL,
    );

    let profile = profile.ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(ok(json!({ "record": profile })))
}

/// Upsert keyed by the path username. Fields left out of the request keep
/// their stored values.
pub async fn update_profile(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state.store.get_profile(&username).await?;

    let base = existing.unwrap_or(Profile {
        username: username.clone(),
        real_name: String::new(),
        phone: String::new(),
        id_card: String::new(),
        emergency_contact: String::new(),
        emergency_phone: String::new(),
        address: String::new(),
        created_at: None,
        updated_at: None,
    });

    let profile = Profile {
        real_name: req.real_name.unwrap_or(base.real_name),
        phone: req.phone.unwrap_or(base.phone),
        id_card: req.id_card.unwrap_or(base.id_card),
        emergency_contact: req.emergency_contact.unwrap_or(base.emergency_contact),
        emergency_phone: req.emergency_phone.unwrap_or(base.emergency_phone),
        address: req.address.unwrap_or(base.address),
        ..base
    };

    let record = state.store.upsert_profile(&profile).await?;
    state.cache.clear_user(&username);

    Ok(ok(json!({ "record": record })))
}

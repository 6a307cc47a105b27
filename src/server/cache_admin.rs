use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::CacheClearParams;
use crate::server::response::{ApiError, ok};

pub async fn stats(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.cache.stats();
    Ok(ok(json!({ "stats": stats })))
}

/// Targeted invalidation for operators. `type` scopes the clear; `user`
/// and `schedule` additionally take a username (and optionally a date).
pub async fn clear(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<CacheClearParams>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = params.kind.as_deref().unwrap_or("all");
    let scoped_username = || {
        params
            .username
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("username is required for scoped cache clears"))
    };

    let cleared = match kind {
        "user" => {
            let username = scoped_username()?;
            state.cache.clear_user(username);
            format!("user entries for {username}")
        }
        "schedule" => {
            let username = scoped_username()?;
            state.cache.clear_schedules(username, params.date.as_deref());
            match &params.date {
                Some(date) => format!("schedule entries for {username} on {date}"),
                None => format!("schedule entries for {username}"),
            }
        }
        "all" => {
            state.cache.clear_all();
            "all entries".to_string()
        }
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown cache type {other:?}, expected user, schedule or all"
            )));
        }
    };

    tracing::info!("cache cleared: {cleared}");
    Ok(ok(json!({ "message": format!("Cleared {cleared}") })))
}

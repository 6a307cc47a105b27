use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::HotelUpdateRequest;
use crate::server::response::{ApiError, ok};
use crate::types::{DEFAULT_WEBSITE_NAME, Hotel};

/// Missing settings answer with the default site name rather than a 404,
/// so clients never special-case first use.
pub async fn get_hotel(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.store.get_hotel(&username).await?.unwrap_or(Hotel {
        username,
        website_name: DEFAULT_WEBSITE_NAME.to_string(),
        created_at: None,
        updated_at: None,
    });

    Ok(ok(json!({ "record": record })))
}

pub async fn update_hotel(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(req): Json<HotelUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let website_name = req
        .website_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("websiteName is required"))?;

    let hotel = Hotel {
        username: username.clone(),
        website_name,
        created_at: None,
        updated_at: None,
    };
    let record = state.store.upsert_hotel(&hotel).await?;
    state.cache.clear_user(&username);

    Ok(ok(json!({ "record": record })))
}

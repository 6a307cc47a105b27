use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::server::AppState;
use crate::server::dto::{CreateShopRequest, UpdateShopRequest};
use crate::server::response::{ApiError, created, ok};
use crate::store::remove_shop_membership;
use crate::types::{SchedulePatch, Shop, ShopPatch};

pub async fn list_shops(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let shops = state.store.list_shops().await?;
    Ok(ok(json!({ "records": shops })))
}

pub async fn get_shop(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shop = state
        .store
        .get_shop(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shop not found"))?;
    Ok(ok(json!({ "record": shop })))
}

pub async fn create_shop(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateShopRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.map(|name| name.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::bad_request("Shop name is required"));
    }
    let duplicate = state
        .store
        .list_shops()
        .await?
        .iter()
        .any(|shop| shop.name == name);
    if duplicate {
        return Err(ApiError::conflict("A shop with that name already exists"));
    }

    let shop = Shop {
        id: Uuid::new_v4().to_string(),
        name,
        address: req.address.unwrap_or_default(),
        contact: req.contact.unwrap_or_default(),
        phone: req.phone.unwrap_or_default(),
        notes: req.notes.unwrap_or_default(),
        created_by: auth.username,
        created_at: None,
        updated_at: None,
    };
    let record = state.store.create_shop(&shop).await?;

    Ok(created(json!({ "record": record })))
}

pub async fn update_shop(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateShopRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .store
        .get_shop(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shop not found"))?;

    let patch = ShopPatch {
        name: req.name.map(|name| name.trim().to_string()),
        address: req.address,
        contact: req.contact,
        phone: req.phone,
        notes: req.notes,
    };
    if patch.name.as_deref() == Some("") {
        return Err(ApiError::bad_request("Shop name cannot be empty"));
    }

    let record = state
        .store
        .update_shop(&id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Shop not found"))?;

    // Schedules reference shops by name, so a rename has to follow into
    // every membership array.
    if record.name != existing.name {
        rename_memberships(&state, &existing.name, &record.name).await?;
    }

    Ok(ok(json!({ "record": record })))
}

pub async fn delete_shop(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let shop = state
        .store
        .get_shop(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shop not found"))?;

    let affected = cascade_delete(&state, &shop.name).await?;
    state.store.delete_shop(&id).await?;
    state.cache.clear_all();

    Ok(ok(json!({
        "message": "Shop deleted",
        "affectedSchedules": affected,
    })))
}

/// Removes the shop from every schedule that names it. A schedule whose
/// membership list empties out is deleted with it.
async fn cascade_delete(state: &AppState, shop_name: &str) -> Result<u64, ApiError> {
    let schedules = state.store.list_schedules(None, None).await?;
    let mut affected = 0u64;
    for schedule in &schedules {
        if !schedule.work_store.iter().any(|name| name == shop_name) {
            continue;
        }
        affected += 1;
        match remove_shop_membership(&schedule.work_store, shop_name) {
            Some(remaining) => {
                let patch = SchedulePatch {
                    work_store: Some(remaining),
                    ..Default::default()
                };
                state.store.update_schedule(&schedule.id, &patch).await?;
            }
            None => {
                state.store.delete_schedule(&schedule.id).await?;
            }
        }
    }
    Ok(affected)
}

async fn rename_memberships(
    state: &AppState,
    old_name: &str,
    new_name: &str,
) -> Result<(), ApiError> {
    let schedules = state.store.list_schedules(None, None).await?;
    for schedule in &schedules {
        if !schedule.work_store.iter().any(|name| name == old_name) {
            continue;
        }
        let renamed: Vec<String> = schedule
            .work_store
            .iter()
            .map(|name| {
                if name == old_name {
                    new_name.to_string()
                } else {
                    name.clone()
                }
            })
            .collect();
        let patch = SchedulePatch {
            work_store: Some(renamed),
            ..Default::default()
        };
        state.store.update_schedule(&schedule.id, &patch).await?;
    }
    state.cache.clear_all();
    Ok(())
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{OptionalAuth, RequireAuth};
use crate::cache::{self, Partition, SCHEDULE_TTL};
use crate::server::AppState;
use crate::server::dto::{CreateScheduleRequest, ScheduleQuery, UpdateScheduleRequest};
use crate::server::response::{ApiError, created, ok};
use crate::server::validation::{
    duration_hours, ensure_user_tag, validate_date, validate_time, validate_time_order,
};
use crate::types::{Schedule, SchedulePatch};

/// Listing works for anonymous dashboard widgets too, as long as they say
/// whose calendar they want.
pub async fn list_schedules(
    OptionalAuth(auth): OptionalAuth,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScheduleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let username = params
        .username
        .or(auth.map(|user| user.username))
        .ok_or_else(|| ApiError::bad_request("username is required"))?;
    let date = params.date;

    let key = cache::schedules_key(&username, date.as_deref().unwrap_or("all"));
    let store = state.store.clone();
    let owner = username.clone();
    let date_filter = date.clone();
    let records = state
        .cache
        .wrap(Partition::Schedule, &key, SCHEDULE_TTL, async move {
            let schedules = store
                .list_schedules(Some(&owner), date_filter.as_deref())
                .await?;
            Ok(serde_json::to_value(schedules)?)
        })
        .await
        .map_err(ApiError::from)?;

    Ok(ok(json!({ "records": records })))
}

pub async fn create_schedule(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut missing = Vec::new();
    if req.work_store.as_ref().is_none_or(Vec::is_empty) {
        missing.push("workStore");
    }
    if req.work_date.is_none() {
        missing.push("workDate");
    }
    if req.start_time.is_none() {
        missing.push("startTime");
    }
    if req.end_time.is_none() {
        missing.push("endTime");
    }
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }
    let (work_store, work_date, start_time, end_time) = (
        req.work_store.unwrap_or_default(),
        req.work_date.unwrap_or_default(),
        req.start_time.unwrap_or_default(),
        req.end_time.unwrap_or_default(),
    );

    validate_date(&work_date)?;
    let start = validate_time(&start_time, "startTime")?;
    let end = validate_time(&end_time, "endTime")?;
    validate_time_order(start, end)?;

    let username = req.username.unwrap_or(auth.username);
    let duration = req.duration.unwrap_or_else(|| duration_hours(start, end));
    let notes = ensure_user_tag(req.notes.as_deref().unwrap_or_default(), &username);

    let schedule = Schedule {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        work_store,
        work_date,
        start_time,
        end_time,
        duration,
        notes,
        created_at: None,
        updated_at: None,
    };
    let record = state.store.create_schedule(&schedule).await?;
    // A record can surface in another user's listing through the notes tag,
    // so every mutation drops the whole partition rather than one owner's
    // keys.
    state.cache.clear_prefix(Partition::Schedule, "schedules:");

    Ok(created(json!({ "record": record })))
}

pub async fn update_schedule(
    RequireAuth(auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(date) = &req.work_date {
        validate_date(date)?;
    }
    let start = req
        .start_time
        .as_deref()
        .map(|t| validate_time(t, "startTime"))
        .transpose()?;
    let end = req
        .end_time
        .as_deref()
        .map(|t| validate_time(t, "endTime"))
        .transpose()?;
    // Times are only checkable as a pair; a lone startTime could silently
    // jump past the stored endTime.
    if start.is_some() != end.is_some() {
        return Err(ApiError::bad_request(
            "startTime and endTime must be updated together",
        ));
    }
    if let (Some(start), Some(end)) = (start, end) {
        validate_time_order(start, end)?;
    }

    // When both times change and no duration was sent, re-derive it so the
    // stored hours never drift from the times.
    let duration = match (req.duration, start, end) {
        (Some(d), _, _) => Some(d),
        (None, Some(start), Some(end)) => Some(duration_hours(start, end)),
        _ => None,
    };

    let patch = SchedulePatch {
        username: None,
        work_store: req.work_store,
        work_date: req.work_date,
        start_time: req.start_time,
        end_time: req.end_time,
        duration,
        notes: req
            .notes
            .map(|notes| ensure_user_tag(&notes, &auth.username)),
    };

    let record = state
        .store
        .update_schedule(&id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Schedule not found"))?;
    state.cache.clear_prefix(Partition::Schedule, "schedules:");

    Ok(ok(json!({ "record": record })))
}

pub async fn delete_schedule(
    RequireAuth(_auth): RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.store.delete_schedule(&id).await?;
    if !deleted {
        return Err(ApiError::not_found("Schedule not found"));
    }
    state.cache.clear_prefix(Partition::Schedule, "schedules:");

    Ok(ok(json!({ "message": "Schedule deleted" })))
}

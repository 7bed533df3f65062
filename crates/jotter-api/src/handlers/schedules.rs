//! Recurrence schedule handlers.
//!
//! A metric has at most one data schedule and a task at most one occurrence
//! schedule, so both are addressed through their parent:
//! `/metric/{id}/schedule` and `/task/{id}/schedule`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use jotter_core::{CreateDataScheduleRequest, CreateOccurrenceScheduleRequest, UpdateScheduleRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::{response, ApiError, AppState};

// =============================================================================
// DATA SCHEDULES
// =============================================================================

pub async fn get_data_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .get_data_schedule_tx(&mut tx, auth.user_id, metric_id)
        .await?;
    tx.commit().await?;
    Ok(response::item(found(schedule, format!("schedule for metric {metric_id}"))?))
}

/// Cron fields default to `*`; `next_run` is computed from now.
pub async fn create_data_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateDataScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .create_data_schedule_tx(&mut tx, auth.user_id, metric_id, &req, Utc::now())
        .await?;
    tx.commit().await?;
    info!(
        subsystem = "api",
        user_id = auth.user_id,
        schedule_id = schedule.id,
        next_run = %schedule.next_run,
        "Data schedule created"
    );
    Ok(response::created(schedule.id))
}

pub async fn update_data_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .update_data_schedule_tx(&mut tx, auth.user_id, metric_id, &req, Utc::now())
        .await?;
    let schedule = found(schedule, format!("schedule for metric {metric_id}"))?;
    tx.commit().await?;
    Ok(response::item(schedule))
}

pub async fn delete_data_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state
        .db
        .schedules
        .delete_data_schedule_tx(&mut tx, auth.user_id, metric_id)
        .await?;
    tx.commit().await?;
    deleted(matched, format!("schedule for metric {metric_id}"))
}

// =============================================================================
// OCCURRENCE SCHEDULES
// =============================================================================

pub async fn get_occurrence_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .get_occurrence_schedule_tx(&mut tx, auth.user_id, task_id)
        .await?;
    tx.commit().await?;
    Ok(response::item(found(schedule, format!("schedule for task {task_id}"))?))
}

pub async fn create_occurrence_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateOccurrenceScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .create_occurrence_schedule_tx(&mut tx, auth.user_id, task_id, &req, Utc::now())
        .await?;
    tx.commit().await?;
    info!(
        subsystem = "api",
        user_id = auth.user_id,
        schedule_id = schedule.id,
        next_run = %schedule.next_run,
        "Occurrence schedule created"
    );
    Ok(response::created(schedule.id))
}

/// Changing any cron field or the period recomputes `next_run` from now.
pub async fn update_occurrence_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let schedule = state
        .db
        .schedules
        .update_occurrence_schedule_tx(&mut tx, auth.user_id, task_id, &req, Utc::now())
        .await?;
    let schedule = found(schedule, format!("schedule for task {task_id}"))?;
    tx.commit().await?;
    Ok(response::item(schedule))
}

pub async fn delete_occurrence_schedule(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state
        .db
        .schedules
        .delete_occurrence_schedule_tx(&mut tx, auth.user_id, task_id)
        .await?;
    tx.commit().await?;
    deleted(matched, format!("schedule for task {task_id}"))
}

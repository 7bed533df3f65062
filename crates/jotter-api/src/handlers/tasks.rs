use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateTaskRequest, UpdateTaskRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

pub async fn list_tasks(
    auth: AuthUser,
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params.filter(auth.user_id, Utc::now())?;
    let mut tx = state.db.begin().await?;
    let (tasks, total) = state.db.tasks.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(tasks, total, filter.page))
}

pub async fn get_task(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let task = state.db.tasks.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(task, format!("task {id}"))?))
}

pub async fn create_task(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let task = state.db.tasks.create_tx(&mut tx, auth.user_id, &req).await?;
    tx.commit().await?;
    Ok(response::created(task.id))
}

/// PATCH; a `tags` array replaces the task's tag set.
pub async fn update_task(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let task = state.db.tasks.update_tx(&mut tx, auth.user_id, id, &req).await?;
    let task = found(task, format!("task {id}"))?;
    tx.commit().await?;
    Ok(response::item(task))
}

pub async fn delete_task(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.tasks.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("task {id}"))
}

//! Occurrence handlers: dated instances of a task.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateOccurrenceRequest, Origin, UpdateOccurrenceRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

/// `GET /task/{id}/occurrence`; a task the caller does not own yields an empty page.
pub async fn list_occurrences(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params
        .filter(auth.user_id, Utc::now())?
        .with_parent(task_id);
    let mut tx = state.db.begin().await?;
    let (occurrences, total) = state.db.occurrences.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(occurrences, total, filter.page))
}

pub async fn create_occurrence(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(task_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateOccurrenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let occurrence = state
        .db
        .occurrences
        .create_tx(&mut tx, auth.user_id, task_id, &req, Origin::User, None)
        .await?;
    tx.commit().await?;
    Ok(response::created(occurrence.id))
}

pub async fn get_occurrence(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let occurrence = state.db.occurrences.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(occurrence, format!("occurrence {id}"))?))
}

pub async fn update_occurrence(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateOccurrenceRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let occurrence = state
        .db
        .occurrences
        .update_tx(&mut tx, auth.user_id, id, &req)
        .await?;
    let occurrence = found(occurrence, format!("occurrence {id}"))?;
    tx.commit().await?;
    Ok(response::item(occurrence))
}

pub async fn delete_occurrence(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.occurrences.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("occurrence {id}"))
}

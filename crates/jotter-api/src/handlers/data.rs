use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateDataRequest, Origin, UpdateDataRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

/// `GET /metric/{id}/data`, newest first.
pub async fn list_data(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params
        .filter(auth.user_id, Utc::now())?
        .with_parent(metric_id);
    let mut tx = state.db.begin().await?;
    let (points, total) = state.db.data.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(points, total, filter.page))
}

pub async fn create_data(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(metric_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateDataRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let point = state
        .db
        .data
        .create_tx(&mut tx, auth.user_id, metric_id, &req, Origin::User, None)
        .await?;
    tx.commit().await?;
    Ok(response::created(point.id))
}

pub async fn get_data(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let point = state.db.data.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(point, format!("data {id}"))?))
}

pub async fn update_data(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateDataRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let point = state.db.data.update_tx(&mut tx, auth.user_id, id, &req).await?;
    let point = found(point, format!("data {id}"))?;
    tx.commit().await?;
    Ok(response::item(point))
}

pub async fn delete_data(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.data.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("data {id}"))
}

//! Metric handlers.
//!
//! Metric rows are not time-filtered; `start`/`end` select which of their
//! data points are embedded in the response.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateMetricRequest, UpdateMetricRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

pub async fn list_metrics(
    auth: AuthUser,
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params.filter(auth.user_id, Utc::now())?;
    let mut tx = state.db.begin().await?;
    let (metrics, total) = state.db.metrics.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(metrics, total, filter.page))
}

pub async fn get_metric(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let range = params.time_range(Utc::now())?;
    let mut tx = state.db.begin().await?;
    let metric = state.db.metrics.get_tx(&mut tx, auth.user_id, id, &range).await?;
    tx.commit().await?;
    Ok(response::item(found(metric, format!("metric {id}"))?))
}

/// Names are normalized; a second metric with the same normalized name is a 409.
pub async fn create_metric(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateMetricRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let metric = state.db.metrics.create_tx(&mut tx, auth.user_id, &req).await?;
    tx.commit().await?;
    Ok(response::created(metric.id))
}

pub async fn update_metric(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateMetricRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let metric = state.db.metrics.update_tx(&mut tx, auth.user_id, id, &req).await?;
    let metric = found(metric, format!("metric {id}"))?;
    tx.commit().await?;
    Ok(response::item(metric))
}

pub async fn delete_metric(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.metrics.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("metric {id}"))
}

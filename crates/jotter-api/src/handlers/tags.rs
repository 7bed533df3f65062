//! Tag handlers.
//!
//! Tags are addressed by their normalized name: creating "Heart Rate" when
//! `heart_rate` exists is a conflict, and a rename re-normalizes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateTagRequest, UpdateTagRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

pub async fn list_tags(
    auth: AuthUser,
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params.filter(auth.user_id, Utc::now())?;
    let mut tx = state.db.begin().await?;
    let (tags, total) = state.db.tags.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(tags, total, filter.page))
}

pub async fn get_tag(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let tag = state.db.tags.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(tag, format!("tag {id}"))?))
}

pub async fn create_tag(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.as_deref().unwrap_or_default();
    let mut tx = state.db.begin().await?;
    let tag = state.db.tags.create_tx(&mut tx, auth.user_id, name).await?;
    tx.commit().await?;
    Ok(response::created(tag.id))
}

pub async fn update_tag(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateTagRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let tag = match req.name.as_deref() {
        Some(name) => state.db.tags.rename_tx(&mut tx, auth.user_id, id, name).await?,
        None => state.db.tags.get_tx(&mut tx, auth.user_id, id).await?,
    };
    let tag = found(tag, format!("tag {id}"))?;
    tx.commit().await?;
    Ok(response::item(tag))
}

/// Delete a tag; its assignments cascade, the tagged entities stay.
pub async fn delete_tag(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.tags.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("tag {id}"))
}

//! Link handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;

use jotter_core::{CreateLinkRequest, UpdateLinkRequest};

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

pub async fn list_links(
    auth: AuthUser,
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params.filter(auth.user_id, Utc::now())?;
    let mut tx = state.db.begin().await?;
    let (links, total) = state.db.links.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(links, total, filter.page))
}

pub async fn get_link(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let link = state.db.links.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(link, format!("link {id}"))?))
}

/// A `note_id`, when given, must name one of the caller's notes.
pub async fn create_link(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tx = state.db.begin().await?;
    let link = state.db.links.create_tx(&mut tx, auth.user_id, &req).await?;
    tx.commit().await?;
    Ok(response::created(link.id))
}

/// PATCH; a `tags` array replaces the link's tag set.
pub async fn update_link(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateLinkRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let link = state.db.links.update_tx(&mut tx, auth.user_id, id, &req).await?;
    let link = found(link, format!("link {id}"))?;
    tx.commit().await?;
    Ok(response::item(link))
}

pub async fn delete_link(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.links.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("link {id}"))
}

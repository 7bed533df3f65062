//! Note handlers.
//!
//! Creating a note queues its first pipeline stages in the same transaction,
//! so a committed note always has work waiting for the worker.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use jotter_core::{CreateNoteRequest, Error, JobPayload, UpdateNoteRequest};
use jotter_db::validate_object_key;

use crate::auth::AuthUser;
use crate::extract::{ApiJson, ApiPath};
use crate::handlers::{deleted, found};
use crate::query::ListParams;
use crate::{response, ApiError, AppState};

pub async fn list_notes(
    auth: AuthUser,
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<Value>, ApiError> {
    let filter = params.filter(auth.user_id, Utc::now())?;
    let mut tx = state.db.begin().await?;
    let (notes, total) = state.db.notes.list_tx(&mut tx, &filter).await?;
    tx.commit().await?;
    Ok(response::list(notes, total, filter.page))
}

pub async fn get_note(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let note = state.db.notes.get_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    Ok(response::item(found(note, format!("note {id}"))?))
}

/// Create a note from text, an uploaded audio key, an uploaded image key, or any mix.
pub async fn create_note(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for key in [&req.audio_key, &req.image_key].into_iter().flatten() {
        if !key.trim().is_empty() {
            validate_object_key(key.trim())?;
        }
    }

    let mut tx = state.db.begin().await?;
    let note = state.db.notes.create_tx(&mut tx, auth.user_id, &req).await?;

    let payload = serde_json::to_value(JobPayload {
        entity_id: note.id,
        origin: note.derived_origin(),
    })
    .map_err(Error::from)?;
    let jobs = note.initial_jobs();
    for job_type in &jobs {
        state
            .db
            .jobs
            .queue_tx(
                &mut tx,
                Some(note.id),
                *job_type,
                job_type.default_priority(),
                Some(payload.clone()),
            )
            .await?;
    }
    tx.commit().await?;
    state.db.jobs.wake_workers();

    info!(
        subsystem = "api",
        user_id = auth.user_id,
        note_id = note.id,
        jobs = ?jobs,
        "Note created"
    );
    Ok(response::created(note.id))
}

pub async fn update_note(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateNoteRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let note = state.db.notes.update_tx(&mut tx, auth.user_id, id, &req).await?;
    let note = found(note, format!("note {id}"))?;
    tx.commit().await?;
    Ok(response::item(note))
}

/// Delete a note; derived rows and queued jobs cascade with it.
pub async fn delete_note(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.notes.delete_tx(&mut tx, auth.user_id, id).await?;
    tx.commit().await?;
    deleted(matched, format!("note {id}"))
}

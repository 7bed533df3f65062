//! Media upload.
//!
//! Accepts `multipart/form-data` with a single `file` field and stores it in
//! the object store. The returned key is then passed as `audio_key` or
//! `image_key` when creating a note.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use jotter_db::{generate_object_key, ObjectKind};

use crate::auth::AuthUser;
use crate::extract::ApiQuery;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    /// `audio` or `image`.
    pub kind: String,
}

/// Store an uploaded object.
///
/// # Returns
/// - 201 Created with `{"status":"created","key":…,"mime_type":…,"size":…}`
/// - 400 Bad Request if the file is missing, empty, or its content does not match `kind`
/// - 413 Payload Too Large above `MAX_UPLOAD_BYTES`
pub async fn upload(
    auth: AuthUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<UploadParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let kind: ObjectKind = params.kind.parse()?;

    let mut file_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            file_data = Some(field.bytes().await?.to_vec());
        }
    }

    let bytes = file_data
        .ok_or_else(|| ApiError::BadRequest("Missing file in multipart form".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    // Trust the content, not the client's Content-Type.
    let detected = infer::get(&bytes)
        .ok_or_else(|| ApiError::BadRequest("Unrecognized file type".into()))?;
    if !kind.accepts(detected.mime_type()) {
        return Err(ApiError::BadRequest(format!(
            "{} is not an accepted {kind} type",
            detected.mime_type()
        )));
    }

    let key = generate_object_key(kind, detected.extension(), Utc::now());
    state.storage.write(&key, &bytes).await?;

    info!(
        subsystem = "api",
        user_id = auth.user_id,
        object_key = %key,
        mime_type = detected.mime_type(),
        size = bytes.len(),
        "Object uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "created",
            "key": key,
            "mime_type": detected.mime_type(),
            "size": bytes.len(),
        })),
    ))
}

//! Pipeline stage handlers.
//!
//! Every stage follows the same shape: lock the note and check its flag,
//! release the lock for the model call, then lock again and re-check before
//! writing. A redelivered job therefore finds the flag set and skips.

mod describe_image;
mod extract;
mod tagging;
mod transcribe;

pub use describe_image::DescribeImageHandler;
pub use extract::ExtractEntitiesHandler;
pub use tagging::TaggingHandler;
pub use transcribe::TranscribeAudioHandler;

use serde_json::json;
use sqlx::{Postgres, Transaction};
use tracing::debug;

use jotter_core::{JobPayload, JobType, Note, Origin, Result};
use jotter_db::Database;

use crate::handler::JobResult;

/// What the external half of a media stage came back with.
pub(crate) enum StageOutput<T> {
    Produced(T),
    /// Nothing can be produced for this note; the reason is recorded and the
    /// pipeline moves on without the derived text.
    Unavailable(String),
}

impl<T> StageOutput<T> {
    /// Sort a fallible step: data problems become `Unavailable`, transient
    /// errors end the attempt with `Retry`.
    pub(crate) fn settle(result: Result<T>) -> std::result::Result<Self, JobResult> {
        match result {
            Ok(value) => Ok(StageOutput::Produced(value)),
            Err(e) => match JobResult::from(e) {
                JobResult::Skipped(reason) => Ok(StageOutput::Unavailable(reason)),
                other => Err(other),
            },
        }
    }
}

/// Lock the payload's note, or explain why the stage has nothing to do.
pub(crate) async fn lock_note(
    db: &Database,
    tx: &mut Transaction<'_, Postgres>,
    note_id: i64,
) -> std::result::Result<Note, JobResult> {
    match db.notes.lock_for_pipeline(tx, note_id).await {
        Ok(Some(note)) => Ok(note),
        Ok(None) => Err(JobResult::Skipped(format!("note {note_id} no longer exists"))),
        Err(e) => Err(e.into()),
    }
}

/// Queue the next stage for `note_id` inside `tx`.
pub(crate) async fn queue_stage(
    db: &Database,
    tx: &mut Transaction<'_, Postgres>,
    note_id: i64,
    job_type: JobType,
    origin: Origin,
) -> Result<()> {
    let payload = JobPayload {
        entity_id: note_id,
        origin,
    };
    let job_id = db
        .jobs
        .queue_tx(
            tx,
            Some(note_id),
            job_type,
            job_type.default_priority(),
            Some(serde_json::to_value(payload)?),
        )
        .await?;
    debug!(%job_id, note_id, job_type = %job_type, "Queued next pipeline stage");
    Ok(())
}

/// After a media stage has written its result, queue extraction once every
/// media object on the note is done. `note` must reflect the write.
pub(crate) async fn queue_extraction_when_ready(
    db: &Database,
    tx: &mut Transaction<'_, Postgres>,
    note: &Note,
) -> Result<bool> {
    if !note.media_processed() || note.text_processed {
        return Ok(false);
    }
    queue_stage(db, tx, note.id, JobType::ExtractEntities, note.derived_origin()).await?;
    Ok(true)
}

/// Result data recorded on a media job.
pub(crate) fn media_result(stored: bool, extraction_queued: bool) -> JobResult {
    JobResult::Success(Some(json!({
        "stored": stored,
        "extraction_queued": extraction_queued,
    })))
}

/// MIME type of a stored object, from the extension its key was minted with.
pub(crate) fn mime_from_key(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "webm" => "audio/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_key() {
        assert_eq!(mime_from_key("audio/2026/10/abc.m4a"), "audio/mp4");
        assert_eq!(mime_from_key("image/2026/10/abc.JPG"), "image/jpeg");
        assert_eq!(mime_from_key("image/2026/10/abc.png"), "image/png");
        assert_eq!(mime_from_key("audio/2026/10/abc"), "application/octet-stream");
    }

    #[test]
    fn test_media_result_shape() {
        let JobResult::Success(Some(data)) = media_result(true, false) else {
            panic!("expected success with data");
        };
        assert_eq!(data["stored"], true);
        assert_eq!(data["extraction_queued"], false);
    }
}

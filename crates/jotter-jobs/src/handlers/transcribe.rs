use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use jotter_core::{has_content, Error, JobType};
use jotter_db::{Database, StorageBackend};
use jotter_inference::TranscriptionBackend;

use super::{lock_note, media_result, mime_from_key, queue_extraction_when_ready, StageOutput};
use crate::handler::{try_stage, JobContext, JobHandler, JobResult};

/// Turns a note's audio object into `audio_transcript`.
pub struct TranscribeAudioHandler {
    db: Database,
    storage: Arc<dyn StorageBackend>,
    backend: Option<Arc<dyn TranscriptionBackend>>,
}

impl TranscribeAudioHandler {
    /// `backend` is `None` when no transcription service is configured.
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageBackend>,
        backend: Option<Arc<dyn TranscriptionBackend>>,
    ) -> Self {
        Self {
            db,
            storage,
            backend,
        }
    }

    async fn transcribe(&self, key: &str) -> Result<StageOutput<String>, JobResult> {
        let Some(backend) = &self.backend else {
            return Ok(StageOutput::Unavailable(
                "transcription backend not configured".into(),
            ));
        };
        let data = match StageOutput::settle(self.storage.read(key).await)? {
            StageOutput::Produced(data) => data,
            StageOutput::Unavailable(reason) => return Ok(StageOutput::Unavailable(reason)),
        };
        let result = backend.transcribe(&data, mime_from_key(key)).await;
        Ok(match StageOutput::settle(result)? {
            StageOutput::Produced(t) if t.text.is_empty() => {
                StageOutput::Unavailable("transcription was empty".into())
            }
            StageOutput::Produced(t) => StageOutput::Produced(t.text),
            StageOutput::Unavailable(reason) => StageOutput::Unavailable(reason),
        })
    }
}

#[async_trait]
impl JobHandler for TranscribeAudioHandler {
    fn job_type(&self) -> JobType {
        JobType::TranscribeAudio
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "transcribe", job_id = %ctx.job.id))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();
        let note_id = try_stage!(ctx.payload()).entity_id;

        let audio_key = {
            let mut tx = try_stage!(self.db.begin().await);
            let note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
            if note.audio_processed {
                return JobResult::Skipped("audio already processed".into());
            }
            if !has_content(&note.audio_key) {
                return JobResult::Skipped("note has no audio".into());
            }
            note.audio_key.unwrap_or_default()
        };

        let output = try_stage!(self.transcribe(&audio_key).await);
        let transcript = match &output {
            StageOutput::Produced(text) => Some(text.as_str()),
            StageOutput::Unavailable(reason) => {
                warn!(note_id, %reason, "No transcript for note audio");
                None
            }
        };

        let mut tx = try_stage!(self.db.begin().await);
        let mut note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
        if note.audio_processed {
            return JobResult::Skipped("audio processed by a concurrent delivery".into());
        }
        try_stage!(
            self.db
                .notes
                .set_transcript_for_pipeline(&mut tx, note_id, transcript)
                .await
        );
        note.audio_processed = true;
        note.audio_transcript = transcript.map(str::to_string);
        let queued = try_stage!(queue_extraction_when_ready(&self.db, &mut tx, &note).await);
        try_stage!(tx.commit().await.map_err(Error::Database));
        if queued {
            self.db.jobs.wake_workers();
        }

        info!(
            note_id,
            transcript_len = transcript.map(str::len).unwrap_or(0),
            extraction_queued = queued,
            duration_ms = start.elapsed().as_millis() as u64,
            "Audio stage finished"
        );
        match output {
            StageOutput::Produced(_) => media_result(true, queued),
            StageOutput::Unavailable(reason) => JobResult::Skipped(reason),
        }
    }
}

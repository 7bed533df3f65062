use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use jotter_core::{has_content, Error, JobType};
use jotter_db::{Database, StorageBackend};
use jotter_inference::vision::describe_note_image;
use jotter_inference::{ImageDescription, VisionBackend};

use super::{lock_note, media_result, mime_from_key, queue_extraction_when_ready, StageOutput};
use crate::handler::{try_stage, JobContext, JobHandler, JobResult};

/// Describes a note's image and keeps any text visible in it.
pub struct DescribeImageHandler {
    db: Database,
    storage: Arc<dyn StorageBackend>,
    backend: Option<Arc<dyn VisionBackend>>,
}

impl DescribeImageHandler {
    pub fn new(
        db: Database,
        storage: Arc<dyn StorageBackend>,
        backend: Option<Arc<dyn VisionBackend>>,
    ) -> Self {
        Self {
            db,
            storage,
            backend,
        }
    }

    async fn describe(&self, key: &str) -> Result<StageOutput<ImageDescription>, JobResult> {
        let Some(backend) = &self.backend else {
            return Ok(StageOutput::Unavailable("vision backend not configured".into()));
        };
        let data = match StageOutput::settle(self.storage.read(key).await)? {
            StageOutput::Produced(data) => data,
            StageOutput::Unavailable(reason) => return Ok(StageOutput::Unavailable(reason)),
        };
        StageOutput::settle(describe_note_image(backend.as_ref(), &data, mime_from_key(key)).await)
    }
}

#[async_trait]
impl JobHandler for DescribeImageHandler {
    fn job_type(&self) -> JobType {
        JobType::DescribeImage
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "describe_image", job_id = %ctx.job.id))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();
        let note_id = try_stage!(ctx.payload()).entity_id;

        let image_key = {
            let mut tx = try_stage!(self.db.begin().await);
            let note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
            if note.image_processed {
                return JobResult::Skipped("image already processed".into());
            }
            if !has_content(&note.image_key) {
                return JobResult::Skipped("note has no image".into());
            }
            note.image_key.unwrap_or_default()
        };

        let output = try_stage!(self.describe(&image_key).await);
        let (description, visible_text) = match &output {
            StageOutput::Produced(parsed) => {
                (Some(parsed.description.as_str()), parsed.visible_text.as_deref())
            }
            StageOutput::Unavailable(reason) => {
                warn!(note_id, %reason, "No description for note image");
                (None, None)
            }
        };

        let mut tx = try_stage!(self.db.begin().await);
        let mut note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
        if note.image_processed {
            return JobResult::Skipped("image processed by a concurrent delivery".into());
        }
        try_stage!(
            self.db
                .notes
                .set_image_description_for_pipeline(&mut tx, note_id, description, visible_text)
                .await
        );
        note.image_processed = true;
        note.image_description = description.map(str::to_string);
        note.image_text = visible_text.map(str::to_string);
        let queued = try_stage!(queue_extraction_when_ready(&self.db, &mut tx, &note).await);
        try_stage!(tx.commit().await.map_err(Error::Database));
        if queued {
            self.db.jobs.wake_workers();
        }

        info!(
            note_id,
            has_visible_text = visible_text.is_some(),
            extraction_queued = queued,
            duration_ms = start.elapsed().as_millis() as u64,
            "Image stage finished"
        );
        match output {
            StageOutput::Produced(_) => media_result(true, queued),
            StageOutput::Unavailable(reason) => JobResult::Skipped(reason),
        }
    }
}

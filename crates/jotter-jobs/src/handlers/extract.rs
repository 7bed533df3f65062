use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info, instrument, warn};

use jotter_core::{
    normalize_name, CreateDataRequest, CreateLinkRequest, CreateOccurrenceRequest,
    CreateTaskRequest, Error, GenerationBackend, JobType, Note, Origin, Result,
};
use jotter_db::Database;
use jotter_inference::extraction::extract_entities;
use jotter_inference::Extraction;

use super::{lock_note, queue_stage};
use crate::handler::{try_stage, JobContext, JobHandler, JobResult};

/// Rows one extraction pass created.
#[derive(Debug, Default, Clone, Copy, Serialize)]
struct Created {
    data_points: usize,
    links: usize,
    tasks: usize,
}

impl Created {
    fn total(&self) -> usize {
        self.data_points + self.links + self.tasks
    }
}

/// Derives metrics, links and tasks from a note's combined text.
pub struct ExtractEntitiesHandler {
    db: Database,
    backend: Arc<dyn GenerationBackend>,
}

impl ExtractEntitiesHandler {
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { db, backend }
    }

    /// Write everything `found` describes, attributed to `note`.
    async fn store(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note: &Note,
        origin: Origin,
        found: &Extraction,
    ) -> Result<Created> {
        let mut created = Created::default();

        for metric in &found.metrics {
            if normalize_name(&metric.name).is_none() || !metric.value.is_finite() {
                debug!(name = %metric.name, "Dropping unusable extracted metric");
                continue;
            }
            let metric_id = self
                .db
                .metrics
                .find_or_create_by_name_tx(tx, note.user_id, &metric.name)
                .await?;
            let req = CreateDataRequest {
                value: Some(metric.value),
                units: metric.units.clone(),
                time: Some(note.created_at),
            };
            self.db
                .data
                .create_tx(tx, note.user_id, metric_id, &req, origin, Some(note.id))
                .await?;
            created.data_points += 1;
        }

        for link in &found.links {
            let req = CreateLinkRequest {
                note_id: Some(note.id),
                url: Some(link.url.clone()),
                description: link.description.clone(),
                tags: None,
            };
            self.db.links.create_tx(tx, note.user_id, &req).await?;
            created.links += 1;
        }

        for task in &found.tasks {
            let req = CreateTaskRequest {
                note_id: Some(note.id),
                summary: Some(task.summary.clone()),
                description: task.description.clone(),
                tags: None,
            };
            let row = self.db.tasks.create_tx(tx, note.user_id, &req).await?;
            let occurrence = CreateOccurrenceRequest {
                priority: Some(task.priority),
                completed: Some(task.completed),
                time: Some(note.created_at),
            };
            self.db
                .occurrences
                .create_tx(tx, note.user_id, row.id, &occurrence, origin, Some(note.id))
                .await?;
            created.tasks += 1;
        }

        Ok(created)
    }
}

#[async_trait]
impl JobHandler for ExtractEntitiesHandler {
    fn job_type(&self) -> JobType {
        JobType::ExtractEntities
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "extract", job_id = %ctx.job.id))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();
        let payload = try_stage!(ctx.payload());
        let note_id = payload.entity_id;

        let content = {
            let mut tx = try_stage!(self.db.begin().await);
            let note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
            if note.text_processed {
                return JobResult::Skipped("text already processed".into());
            }
            if !note.media_processed() {
                return JobResult::Retry("media stages still pending".into());
            }
            note.content_text()
        };

        let found = if content.is_empty() {
            warn!(note_id, "Note has no text to extract from");
            Extraction::default()
        } else {
            try_stage!(extract_entities(self.backend.as_ref(), &content).await)
        };

        let mut tx = try_stage!(self.db.begin().await);
        let note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
        if note.text_processed {
            return JobResult::Skipped("text processed by a concurrent delivery".into());
        }
        let created = try_stage!(self.store(&mut tx, &note, payload.origin, &found).await);
        try_stage!(
            self.db
                .notes
                .mark_text_processed_for_pipeline(&mut tx, note_id)
                .await
        );
        let tagging_queued = created.total() > 0;
        if tagging_queued {
            try_stage!(queue_stage(&self.db, &mut tx, note_id, JobType::Tagging, payload.origin).await);
        }
        try_stage!(tx.commit().await.map_err(Error::Database));
        if tagging_queued {
            self.db.jobs.wake_workers();
        }

        info!(
            note_id,
            model = self.backend.model_name(),
            data_points = created.data_points,
            links = created.links,
            tasks = created.tasks,
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction stored"
        );
        JobResult::Success(Some(serde_json::json!({
            "created": created,
            "tagging_queued": tagging_queued,
        })))
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::{info, instrument};

use jotter_core::{Error, GenerationBackend, JobType, Result, TagTarget};
use jotter_db::Database;
use jotter_inference::extraction::suggest_tags;
use jotter_inference::TagCandidate;

use super::lock_note;
use crate::handler::{try_stage, JobContext, JobHandler, JobResult};

/// Assigns tags to the tasks, links and metrics a note produced.
pub struct TaggingHandler {
    db: Database,
    backend: Arc<dyn GenerationBackend>,
}

impl TaggingHandler {
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { db, backend }
    }

    async fn untagged_candidates(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: i64,
    ) -> Result<Vec<TagCandidate>> {
        let mut candidates = Vec::new();
        for task in self.db.tasks.untagged_for_note(tx, note_id).await? {
            candidates.push(TagCandidate {
                target: TagTarget::Task(task.id),
                text: joined(&task.summary, task.description.as_deref()),
            });
        }
        for link in self.db.links.untagged_for_note(tx, note_id).await? {
            candidates.push(TagCandidate {
                target: TagTarget::Link(link.id),
                text: joined(&link.url, link.description.as_deref()),
            });
        }
        for metric in self.db.metrics.untagged_for_note(tx, note_id).await? {
            candidates.push(TagCandidate {
                target: TagTarget::Metric(metric.id),
                text: metric.display_name,
            });
        }
        Ok(candidates)
    }
}

fn joined(head: &str, tail: Option<&str>) -> String {
    match tail {
        Some(tail) if !tail.trim().is_empty() => format!("{head}: {tail}"),
        _ => head.to_string(),
    }
}

#[async_trait]
impl JobHandler for TaggingHandler {
    fn job_type(&self) -> JobType {
        JobType::Tagging
    }

    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "tagging", job_id = %ctx.job.id))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let start = Instant::now();
        let note_id = try_stage!(ctx.payload()).entity_id;

        let offered = {
            let mut tx = try_stage!(self.db.begin().await);
            try_stage!(lock_note(&self.db, &mut tx, note_id).await);
            try_stage!(self.untagged_candidates(&mut tx, note_id).await)
        };
        if offered.is_empty() {
            return JobResult::Skipped("nothing left to tag".into());
        }

        let suggested: HashMap<TagTarget, Vec<String>> =
            try_stage!(suggest_tags(self.backend.as_ref(), &offered).await)
                .into_iter()
                .map(|a| (a.target, a.tags))
                .collect();

        let mut tx = try_stage!(self.db.begin().await);
        let note = try_stage!(lock_note(&self.db, &mut tx, note_id).await);
        let still_untagged = try_stage!(self.untagged_candidates(&mut tx, note_id).await);

        // Only what was offered and nobody tagged meanwhile; ignored entities get an empty set.
        let assignments: Vec<(TagTarget, Vec<String>)> = offered
            .iter()
            .filter(|c| still_untagged.iter().any(|s| s.target == c.target))
            .map(|c| {
                let tags = suggested.get(&c.target).cloned().unwrap_or_default();
                (c.target, tags)
            })
            .collect();
        if assignments.is_empty() {
            return JobResult::Skipped("entities tagged by a concurrent delivery".into());
        }

        try_stage!(
            self.db
                .tags
                .assign_tags(&mut tx, note.user_id, &assignments)
                .await
        );
        try_stage!(tx.commit().await.map_err(Error::Database));

        let with_tags = assignments.iter().filter(|(_, t)| !t.is_empty()).count();
        info!(
            note_id,
            model = self.backend.model_name(),
            entities = assignments.len(),
            with_tags,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tags assigned"
        );
        JobResult::Success(Some(serde_json::json!({
            "entities": assignments.len(),
            "with_tags": with_tags,
        })))
    }
}

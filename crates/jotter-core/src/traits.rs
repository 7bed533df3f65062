//! Interfaces at the seams between crates.
//!
//! The Ollama implementation of [`GenerationBackend`] lives in
//! `jotter-inference` and the PostgreSQL [`JobRepository`] in `jotter-db`;
//! workers and pipeline handlers only see the trait objects.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Job, JobType, QueueStats};

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with output constrained to JSON where the backend supports it.
    async fn generate_json_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.generate_with_system(system, prompt).await
    }

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Durable job queue.
///
/// Delivery is at-least-once: a claimed job that is never completed, skipped
/// or failed stays `running` until an operator requeues it, and a failed job
/// is retried until `max_retries` before it is dead-lettered.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job and return its id.
    async fn queue(
        &self,
        note_id: Option<i64>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the highest-priority pending job, oldest first.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Finish a job without effect; it is not retried.
    async fn skip(&self, job_id: Uuid, reason: &str) -> Result<()>;

    /// Record a failure: requeue while retries remain, otherwise dead-letter.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Dead-letter immediately, whatever retries remain.
    async fn dead_letter(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// All jobs queued for a note, newest first.
    async fn get_for_note(&self, note_id: i64) -> Result<Vec<Job>>;

    /// Counts by status.
    async fn queue_stats(&self) -> Result<QueueStats>;
}

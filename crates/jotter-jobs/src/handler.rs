//! Job handler trait and outcome type.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use jotter_core::{Error, Job, JobPayload, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// Get the note ID for this job, if any.
    pub fn note_id(&self) -> Option<i64> {
        self.job.note_id
    }

    /// Decode the stage payload.
    pub fn payload(&self) -> Result<JobPayload, JobResult> {
        self.job
            .payload()
            .map_err(|e| JobResult::Skipped(format!("unreadable payload: {e}")))
    }
}

/// Result of job execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Nothing to do: the note is gone, already processed, or malformed.
    /// Recorded and never retried.
    Skipped(String),
    /// Transient failure; the job goes back to the queue until its retries run out.
    Retry(String),
    /// Can never succeed; dead-lettered on the first attempt.
    Failed(String),
}

impl JobResult {
    /// Classify an error raised while running a stage.
    ///
    /// Missing rows and bad data cannot succeed on redelivery; everything
    /// else (database, storage I/O, model endpoints) might.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::NotFound(_) | Error::InvalidInput(_) | Error::Serialization(_) => {
                JobResult::Skipped(err.to_string())
            }
            _ => JobResult::Retry(err.to_string()),
        }
    }
}

impl From<Error> for JobResult {
    fn from(err: Error) -> Self {
        JobResult::from_error(&err)
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// Unwrap a stage step, turning its error into the job outcome.
macro_rules! try_stage {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return $crate::handler::JobResult::from(err),
        }
    };
}
pub(crate) use try_stage;

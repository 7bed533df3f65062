//! Worker behavior against an in-memory queue.
//!
//! Covers:
//! - Outcome mapping: Success → completed, Skipped → skipped, Retry → retried
//!   until dead-lettered
//! - Handler timeout and missing handler count as failed attempts
//! - Concurrent execution up to `max_concurrent_jobs`
//! - Wakeup through `Notify` without waiting out the poll interval
//! - Graceful shutdown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Notify;
use uuid::Uuid;

use jotter_core::{Job, JobRepository, JobStatus, JobType, QueueStats, Result};
use jotter_jobs::{
    JobContext, JobHandler, JobResult, WorkerBuilder, WorkerConfig, WorkerEvent,
};

// ============================================================================
// IN-MEMORY QUEUE
// ============================================================================

#[derive(Default)]
struct MemoryQueue {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryQueue {
    fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.status)
    }

    fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.jobs.lock().unwrap().iter_mut().find(|j| j.id == id) {
            f(job);
        }
    }
}

#[async_trait]
impl JobRepository for MemoryQueue {
    async fn queue(
        &self,
        note_id: Option<i64>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let id = Uuid::now_v7();
        self.jobs.lock().unwrap().push(Job {
            id,
            note_id,
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.created_at.cmp(&a.created_at))
            });
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.result = result;
            job.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn skip(&self, job_id: Uuid, reason: &str) -> Result<()> {
        self.update(job_id, |job| {
            job.status = JobStatus::Skipped;
            job.error_message = Some(reason.to_string());
            job.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.update(job_id, |job| {
            job.retry_count += 1;
            job.error_message = Some(error.to_string());
            job.status = if job.retry_count >= job.max_retries {
                JobStatus::Failed
            } else {
                JobStatus::Pending
            };
        });
        Ok(())
    }

    async fn dead_letter(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.update(job_id, |job| {
            job.error_message = Some(error.to_string());
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
        });
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.job(job_id))
    }

    async fn get_for_note(&self, note_id: i64) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.note_id == Some(note_id))
            .cloned()
            .collect())
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        let count = |s: JobStatus| jobs.iter().filter(|j| j.status == s).count() as i64;
        Ok(QueueStats {
            pending: count(JobStatus::Pending),
            running: count(JobStatus::Running),
            completed: count(JobStatus::Completed),
            skipped: count(JobStatus::Skipped),
            failed: count(JobStatus::Failed),
        })
    }
}

// ============================================================================
// TEST HANDLERS
// ============================================================================

/// Returns a fixed outcome after an optional delay, tracking concurrency.
struct FixedHandler {
    job_type: JobType,
    outcome: JobResult,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FixedHandler {
    fn new(job_type: JobType, outcome: JobResult) -> Self {
        Self {
            job_type,
            outcome,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl JobHandler for FixedHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(10)
        .with_max_concurrent(4)
}

async fn wait_for_status(queue: &MemoryQueue, id: Uuid, expected: JobStatus) -> bool {
    for _ in 0..300 {
        if queue.status(id) == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_success_completes_job_with_result() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue
        .queue(Some(1), JobType::ExtractEntities, 4, Some(json!({"entity_id": 1, "origin": "text"})))
        .await
        .unwrap();

    let handler = FixedHandler::new(
        JobType::ExtractEntities,
        JobResult::Success(Some(json!({"created": 2}))),
    );
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .start();

    assert!(wait_for_status(&queue, id, JobStatus::Completed).await);
    assert_eq!(queue.job(id).unwrap().result, Some(json!({"created": 2})));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_skipped_job_is_not_retried() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue.queue(Some(1), JobType::Tagging, 2, None).await.unwrap();

    let handler = FixedHandler::new(JobType::Tagging, JobResult::Skipped("note gone".into()));
    let calls = handler.calls.clone();
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .start();

    assert!(wait_for_status(&queue, id, JobStatus::Skipped).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    let job = queue.job(id).unwrap();
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.error_message.as_deref(), Some("note gone"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_until_dead_lettered() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue
        .queue(Some(1), JobType::TranscribeAudio, 6, None)
        .await
        .unwrap();

    let handler = FixedHandler::new(
        JobType::TranscribeAudio,
        JobResult::Retry("whisper unreachable".into()),
    );
    let calls = handler.calls.clone();
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .start();

    assert!(wait_for_status(&queue, id, JobStatus::Failed).await);
    handle.shutdown().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(queue.job(id).unwrap().retry_count, 3);
}

#[tokio::test]
async fn test_timeout_counts_as_failed_attempt() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue
        .queue(Some(1), JobType::DescribeImage, 6, None)
        .await
        .unwrap();

    let handler = FixedHandler::new(JobType::DescribeImage, JobResult::Success(None))
        .with_delay(Duration::from_secs(10));
    let worker = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_job_timeout(Duration::from_millis(20)))
        .with_handler(handler)
        .build();
    let mut events = worker.events();
    let handle = worker.start();

    let failure = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(WorkerEvent::JobFailed { job_id, error, .. }) = events.recv().await {
                return (job_id, error);
            }
        }
    })
    .await
    .expect("timed-out job should report a failure");
    handle.shutdown().await.unwrap();

    assert_eq!(failure.0, id);
    assert_eq!(failure.1, "describe_image timeout after 20ms");
}

#[tokio::test]
async fn test_missing_handler_fails_job() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue.queue(Some(1), JobType::Tagging, 2, None).await.unwrap();

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(FixedHandler::new(JobType::ExtractEntities, JobResult::Success(None)))
        .build()
        .start();

    assert!(wait_for_status(&queue, id, JobStatus::Failed).await);
    handle.shutdown().await.unwrap();
    let job = queue.job(id).unwrap();
    assert_eq!(job.retry_count, 0, "no retries for an unhandled job type");
    assert!(job.error_message.unwrap().contains("No handler"));
}

#[tokio::test]
async fn test_runs_jobs_concurrently() {
    let queue = Arc::new(MemoryQueue::default());
    let mut ids = Vec::new();
    for note in 0..4 {
        ids.push(
            queue
                .queue(Some(note), JobType::ExtractEntities, 4, None)
                .await
                .unwrap(),
        );
    }

    let handler = FixedHandler::new(JobType::ExtractEntities, JobResult::Success(None))
        .with_delay(Duration::from_millis(100));
    let max_running = handler.max_running.clone();
    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config())
        .with_handler(handler)
        .build()
        .start();

    for id in &ids {
        assert!(wait_for_status(&queue, *id, JobStatus::Completed).await);
    }
    handle.shutdown().await.unwrap();
    assert!(max_running.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_higher_priority_claimed_first() {
    let queue = MemoryQueue::default();
    let low = queue.queue(Some(1), JobType::Tagging, 2, None).await.unwrap();
    let high = queue
        .queue(Some(1), JobType::TranscribeAudio, 6, None)
        .await
        .unwrap();

    assert_eq!(queue.claim_next().await.unwrap().unwrap().id, high);
    assert_eq!(queue.claim_next().await.unwrap().unwrap().id, low);
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_wakeup_skips_poll_interval() {
    let queue = Arc::new(MemoryQueue::default());
    let notify = Arc::new(Notify::new());

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_poll_interval(60_000))
        .with_wakeup(notify.clone())
        .with_handler(FixedHandler::new(JobType::Tagging, JobResult::Success(None)))
        .build()
        .start();

    // Let the worker find the queue empty and go idle.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let id = queue.queue(Some(1), JobType::Tagging, 2, None).await.unwrap();

    let mut completed = false;
    for _ in 0..100 {
        notify.notify_waiters();
        if queue.status(id) == Some(JobStatus::Completed) {
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await.unwrap();
    assert!(completed, "worker should wake without waiting a full poll interval");
}

#[tokio::test]
async fn test_shutdown_emits_stopped() {
    let queue = Arc::new(MemoryQueue::default());
    let worker = WorkerBuilder::new(queue)
        .with_config(fast_config())
        .build();
    let mut events = worker.events();
    let handle = worker.start();

    assert_eq!(events.recv().await.unwrap(), WorkerEvent::WorkerStarted);
    handle.shutdown().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), WorkerEvent::WorkerStopped);
}

#[tokio::test]
async fn test_disabled_worker_exits_immediately() {
    let queue = Arc::new(MemoryQueue::default());
    let id = queue.queue(Some(1), JobType::Tagging, 2, None).await.unwrap();

    let handle = WorkerBuilder::new(queue.clone())
        .with_config(fast_config().with_enabled(false))
        .with_handler(FixedHandler::new(JobType::Tagging, JobResult::Success(None)))
        .build()
        .start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.status(id), Some(JobStatus::Pending));
    handle.shutdown().await.unwrap();
}

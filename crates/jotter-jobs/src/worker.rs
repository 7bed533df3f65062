//! Pipeline worker: claims queued note jobs and dispatches them to the
//! registered stage handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use jotter_core::{Error, Job, JobRepository, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Worker tuning, usually read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle sleep between empty claims.
    pub poll_interval_ms: u64,
    /// Jobs claimed and run per batch.
    pub max_concurrent_jobs: usize,
    /// Hard limit on one handler run.
    pub job_timeout: Duration,
    /// `false` leaves queued jobs untouched.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: jotter_core::defaults::JOB_MAX_CONCURRENT,
            job_timeout: Duration::from_secs(jotter_core::defaults::JOB_TIMEOUT_SECS),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Reads `JOB_WORKER_ENABLED`, `JOB_MAX_CONCURRENT`, `JOB_POLL_INTERVAL_MS`
    /// and `JOB_TIMEOUT_SECS`; unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        fn env_num<T: std::str::FromStr>(key: &str, fallback: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(fallback)
        }

        Self {
            poll_interval_ms: env_num("JOB_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            max_concurrent_jobs: env_num(
                "JOB_MAX_CONCURRENT",
                jotter_core::defaults::JOB_MAX_CONCURRENT,
            )
            .max(1),
            job_timeout: Duration::from_secs(env_num(
                "JOB_TIMEOUT_SECS",
                jotter_core::defaults::JOB_TIMEOUT_SECS,
            )),
            enabled: !matches!(
                std::env::var("JOB_WORKER_ENABLED").as_deref(),
                Ok("false") | Ok("0")
            ),
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Lifecycle notifications, mainly for tests and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid, job_type: JobType },
    JobCompleted { job_id: Uuid, job_type: JobType },
    JobSkipped {
        job_id: Uuid,
        job_type: JobType,
        reason: String,
    },
    /// A failed attempt; the queue decides between retry and dead letter.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Returned by [`JobWorker::start`]; owns the shutdown channel.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for in-flight jobs to finish.
    ///
    /// A worker that already stopped (for example because it is disabled)
    /// has no receiver left; that is not an error.
    pub async fn shutdown(self) -> Result<()> {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Worker already stopped");
        }
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Worker task failed: {e}")))
    }

    /// Subscribe to events from this point on.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Long-running queue consumer. Build with [`WorkerBuilder`].
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
    wakeup: Option<Arc<Notify>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Spawn the claim loop onto the runtime.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Claim up to `max_concurrent_jobs` jobs and run them concurrently.
    ///
    /// Sleeps only when the queue is empty, waking early when a job is queued.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Pipeline worker disabled; queued jobs will wait");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            handlers = self.handlers.len(),
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let idle_wakeup = self.wakeup.clone().unwrap_or_else(|| Arc::new(Notify::new()));

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let mut tasks = tokio::task::JoinSet::new();
            for _ in 0..self.config.max_concurrent_jobs {
                match self.jobs.claim_next().await {
                    Ok(Some(job)) => {
                        let runner = self.runner();
                        tasks.spawn(async move { runner.execute_job(job).await });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to claim job");
                        break;
                    }
                }
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = idle_wakeup.notified() => {
                        debug!("Woken by queued job");
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed = tasks.len(), "Running job batch");
                while let Some(joined) = tasks.join_next().await {
                    if let Err(e) = joined {
                        error!(error = %e, "Pipeline stage panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Pipeline worker stopped");
    }

    fn runner(&self) -> JobRunner {
        JobRunner {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            job_timeout: self.config.job_timeout,
        }
    }
}

/// What a spawned task needs to run one claimed job.
struct JobRunner {
    jobs: Arc<dyn JobRepository>,
    handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout: Duration,
}

impl JobRunner {
    async fn execute_job(self, job: Job) {
        let started = Instant::now();
        let (job_id, job_type) = (job.id, job.job_type);

        info!(
            subsystem = "jobs",
            %job_id,
            job_type = %job_type,
            note_id = job.note_id,
            attempt = job.retry_count + 1,
            "Processing job"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let result = match self.handlers.get(&job_type).cloned() {
            Some(handler) => {
                match tokio::time::timeout(self.job_timeout, handler.execute(JobContext::new(job)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(%job_id, job_type = %job_type, "Job exceeded timeout");
                        JobResult::Retry(format!(
                            "{job_type} timeout after {}ms",
                            self.job_timeout.as_millis()
                        ))
                    }
                }
            }
            None => {
                warn!(job_type = %job_type, "No handler registered for job type");
                JobResult::Failed(format!("No handler for job type: {job_type}"))
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            JobResult::Success(output) => {
                if let Err(e) = self.jobs.complete(job_id, output).await {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(%job_id, job_type = %job_type, duration_ms, "Job completed");
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::JobCompleted { job_id, job_type });
                }
            }
            JobResult::Skipped(reason) => {
                if let Err(e) = self.jobs.skip(job_id, &reason).await {
                    error!(error = %e, %job_id, "Failed to mark job as skipped");
                } else {
                    info!(%job_id, job_type = %job_type, %reason, duration_ms, "Job skipped");
                    let _ = self.event_tx.send(WorkerEvent::JobSkipped {
                        job_id,
                        job_type,
                        reason,
                    });
                }
            }
            JobResult::Retry(error) => {
                if let Err(e) = self.jobs.fail(job_id, &error).await {
                    error!(error = %e, %job_id, "Failed to mark job as failed");
                } else {
                    warn!(%job_id, job_type = %job_type, %error, duration_ms, "Job failed");
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        job_type,
                        error,
                    });
                }
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.jobs.dead_letter(job_id, &error).await {
                    error!(error = %e, %job_id, "Failed to dead-letter job");
                } else {
                    error!(%job_id, job_type = %job_type, %error, duration_ms, "Job dead-lettered");
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        job_type,
                        error,
                    });
                }
            }
        }
    }
}

/// Assembles a [`JobWorker`] from a queue and its stage handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    wakeup: Option<Arc<Notify>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: HashMap::new(),
            wakeup: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a handler; a later handler for the same type replaces the earlier one.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        debug!(job_type = %handler.job_type(), "Registered pipeline stage");
        self.handlers.insert(handler.job_type(), Arc::new(handler));
        self
    }

    /// Wake the idle worker through `notify` instead of waiting out the poll interval.
    pub fn with_wakeup(mut self, notify: Arc<Notify>) -> Self {
        self.wakeup = Some(notify);
        self
    }

    pub fn build(self) -> JobWorker {
        let (event_tx, _) = broadcast::channel(jotter_core::defaults::EVENT_BUS_CAPACITY);
        JobWorker {
            jobs: self.jobs,
            config: self.config,
            handlers: Arc::new(self.handlers),
            wakeup: self.wakeup,
            event_tx,
        }
    }
}

//! # jotter-jobs
//!
//! Background processing for jotter.
//!
//! This crate provides:
//! - A job worker that claims queued pipeline jobs and runs them concurrently
//! - The pipeline stages: transcription, image description, entity extraction
//!   and tagging
//! - The periodic scheduler driving recurrence generation and retention purges
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jotter_db::Database;
//! use jotter_jobs::{ExtractEntitiesHandler, WorkerBuilder, WorkerConfig};
//!
//! let db = Database::connect("postgres://...").await?;
//! let backend = Arc::new(jotter_inference::OllamaBackend::from_env());
//!
//! let worker = WorkerBuilder::new(Arc::new(db.jobs.clone()))
//!     .with_config(WorkerConfig::from_env())
//!     .with_wakeup(db.jobs.job_notify())
//!     .with_handler(ExtractEntitiesHandler::new(db.clone(), backend))
//!     .build();
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod handlers;
pub mod scheduler;
pub mod worker;

// Re-export core types
pub use jotter_core::*;

pub use handler::{JobContext, JobHandler, JobResult};
pub use handlers::{DescribeImageHandler, ExtractEntitiesHandler, TaggingHandler, TranscribeAudioHandler};
pub use scheduler::{SchedulerConfig, SchedulerHandle};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default maximum retries for failed jobs.
pub const DEFAULT_MAX_RETRIES: i32 = jotter_core::defaults::JOB_MAX_RETRIES;

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = jotter_core::defaults::JOB_POLL_INTERVAL_MS;

//! Centralized default constants for jotter.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// PAGINATION & QUERY WINDOWS
// =============================================================================

/// Default page size for list endpoints.
pub const PAGE_LIMIT: i64 = 100;

/// Upper bound accepted for `limit`.
pub const PAGE_LIMIT_MAX: i64 = 1000;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

/// Default lookback window for time-ranged queries (hours before now).
pub const LOOKBACK_HOURS: i64 = 24;

/// Maximum number of tag names accepted in one filter or assignment.
pub const MAX_TAGS_PER_REQUEST: usize = 100;

// =============================================================================
// RECURRENCE & RETENTION
// =============================================================================

/// Cron expression driving the recurrence generator (every minute).
pub const RECURRENCE_CRON: &str = "* * * * *";

/// Cron expression driving the retention purger (daily, 00:00 UTC).
pub const RETENTION_CRON: &str = "0 0 * * *";

/// Retention window for data points and occurrences, in calendar months.
pub const RETENTION_MONTHS: u32 = 3;

/// How far ahead the cron evaluator searches before declaring a spec unsatisfiable.
pub const CRON_SEARCH_YEARS: i64 = 8;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Default maximum retries before a job is dead-lettered.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Worker polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 1_000;

/// Maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Hard timeout for a single job execution (seconds).
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Broadcast capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model.
pub const GEN_MODEL: &str = "llama3.1:8b";

/// Default timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Environment variable naming the vision model (enables image description).
pub const ENV_OLLAMA_VISION_MODEL: &str = "OLLAMA_VISION_MODEL";

/// Environment variable naming the Whisper-compatible endpoint.
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";

/// Environment variable naming the Whisper model.
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";

/// Default Whisper model slug.
pub const DEFAULT_WHISPER_MODEL: &str = "Systran/faster-whisper-base";

/// Maximum characters of note content sent to the generative model.
pub const EXTRACTION_MAX_CHARS: usize = 12_000;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Header carrying the verified external identity from the gateway.
pub const IDENTITY_HEADER: &str = "x-auth-subject";

/// Default maximum upload size for audio/image objects (bytes).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default object store root.
pub const OBJECT_STORE_PATH: &str = "/var/lib/jotter/objects";

//! # jotter-db
//!
//! PostgreSQL database layer for jotter.
//!
//! This crate provides:
//! - Connection pool management
//! - Owner-scoped repositories for notes, tasks, occurrences, links, metrics,
//!   data points, tags and schedules
//! - The tag merge routine
//! - The recurrence generator and retention purger passes
//! - The durable job queue
//! - Object storage for uploaded media
//!
//! Entity repositories are stateless and operate on a caller-supplied
//! transaction, so one HTTP request or one pipeline stage is one transaction.
//!
//! ## Example
//!
//! ```rust,ignore
//! use jotter_db::{Database, CreateNoteRequest};
//!
//! let db = Database::connect("postgres://localhost/jotter").await?;
//! let mut tx = db.begin().await?;
//! let note = db.notes.create_tx(&mut tx, user_id, &CreateNoteRequest {
//!     text: Some("ran 5km, heart rate 150".into()),
//!     ..Default::default()
//! }).await?;
//! tx.commit().await?;
//! ```
pub mod data;
pub mod jobs;
pub mod links;
pub mod metrics;
pub mod notes;
pub mod object_store;
pub mod occurrences;
pub mod pool;
pub mod query;
pub mod recurrence;
pub mod retention;
pub mod schedules;
pub mod tags;
pub mod tasks;
pub mod users;

// Always compiled so integration tests (in tests/) can use it
pub mod test_fixtures;

use sqlx::{PgPool, Postgres, Transaction};

// Re-export core types
pub use jotter_core::*;

pub use data::PgDataRepository;
pub use jobs::PgJobRepository;
pub use links::PgLinkRepository;
pub use metrics::PgMetricRepository;
pub use notes::PgNoteRepository;
pub use object_store::{
    generate_object_key, validate_object_key, FilesystemBackend, ObjectKind, StorageBackend,
};
pub use occurrences::PgOccurrenceRepository;
pub use pool::{create_lazy_pool, create_pool, create_pool_with_config, PoolConfig};
pub use query::{build_where, EntityShape, QueryParam, WhereClause};
pub use recurrence::RecurrenceReport;
pub use retention::{retention_cutoff, PurgeReport};
pub use schedules::PgScheduleRepository;
pub use tags::PgTagRepository;
pub use tasks::PgTaskRepository;
pub use users::PgUserRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Trimmed, non-empty view of an optional request field.
pub(crate) fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: PgPool,
    pub users: PgUserRepository,
    pub notes: PgNoteRepository,
    pub tasks: PgTaskRepository,
    pub occurrences: PgOccurrenceRepository,
    pub links: PgLinkRepository,
    pub metrics: PgMetricRepository,
    pub data: PgDataRepository,
    pub tags: PgTagRepository,
    pub schedules: PgScheduleRepository,
    /// Job repository for the processing pipeline.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            notes: PgNoteRepository::new(),
            tasks: PgTaskRepository::new(),
            occurrences: PgOccurrenceRepository::new(),
            links: PgLinkRepository::new(),
            metrics: PgMetricRepository::new(),
            data: PgDataRepository::new(),
            tags: PgTagRepository::new(),
            schedules: PgScheduleRepository::new(),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Start a transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(Error::Database)
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(&Some("  milk ".into())), Some("milk"));
        assert_eq!(trimmed(&Some("   ".into())), None);
        assert_eq!(trimmed(&None), None);
    }
}

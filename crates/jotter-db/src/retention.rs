//! Retention purger: hard-deletes data points and occurrences older than
//! three calendar months.

use std::time::Instant;

use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use jotter_core::defaults::RETENTION_MONTHS;
use jotter_core::{Error, Result};

/// Rows removed by one purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub data_deleted: u64,
    pub occurrences_deleted: u64,
}

/// `now` minus [`RETENTION_MONTHS`] calendar months, clamped to month end.
pub fn retention_cutoff(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    now.checked_sub_months(Months::new(RETENTION_MONTHS))
        .ok_or_else(|| Error::Internal(format!("retention cutoff underflows at {now}")))
}

/// Delete every row strictly older than the cutoff, across all users.
pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<PurgeReport> {
    let start = Instant::now();
    let cutoff = retention_cutoff(now)?;
    let mut tx = pool.begin().await.map_err(Error::Database)?;

    let data_deleted = sqlx::query("DELETE FROM data WHERE time < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

    let occurrences_deleted = sqlx::query("DELETE FROM occurrence WHERE time < $1")
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

    tx.commit().await.map_err(Error::Database)?;

    info!(
        subsystem = "scheduler",
        component = "retention",
        op = "purge_expired",
        %cutoff,
        data_deleted,
        occurrences_deleted,
        duration_ms = start.elapsed().as_millis() as u64,
        "Retention purge committed"
    );
    Ok(PurgeReport {
        data_deleted,
        occurrences_deleted,
    })
}

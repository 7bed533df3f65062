//! Recurrence generator.
//!
//! One pass materializes exactly one data point per due data schedule and one
//! occurrence per due occurrence schedule, and advances each schedule's
//! `next_run`. The whole pass is a single transaction. Due rows are selected
//! with `FOR UPDATE SKIP LOCKED`, so overlapping passes never pick up the same
//! schedule; a pass that starts after another commits sees the advanced
//! `next_run` and leaves the row alone.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use jotter_core::{next_run, DataSchedule, Error, OccurrenceSchedule, Origin, Result};

/// Rows written by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecurrenceReport {
    pub data_points: u64,
    pub occurrences: u64,
}

/// Run one pass in its own transaction. `now` is the timestamp every
/// generated row carries and the base for the next `next_run`.
pub async fn run_pass(pool: &PgPool, now: DateTime<Utc>) -> Result<RecurrenceReport> {
    let start = Instant::now();
    let mut tx = pool.begin().await.map_err(Error::Database)?;
    let report = generate_due_tx(&mut tx, now).await?;
    tx.commit().await.map_err(Error::Database)?;

    info!(
        subsystem = "scheduler",
        component = "recurrence",
        op = "run_pass",
        data_points = report.data_points,
        occurrences = report.occurrences,
        duration_ms = start.elapsed().as_millis() as u64,
        "Recurrence pass committed"
    );
    Ok(report)
}

/// Generate everything due at `now` inside the caller's transaction.
pub async fn generate_due_tx(
    tx: &mut Transaction<'_, Postgres>,
    now: DateTime<Utc>,
) -> Result<RecurrenceReport> {
    let mut report = RecurrenceReport::default();

    let due_data: Vec<DataSchedule> = sqlx::query_as(
        "SELECT id, metric_id, minute, hour, day_of_month, month, day_of_week,
                next_run, period_seconds, value, units
         FROM data_schedule
         WHERE next_run <= $1
         ORDER BY next_run, id
         FOR UPDATE SKIP LOCKED",
    )
    .bind(now)
    .fetch_all(&mut **tx)
    .await
    .map_err(Error::Database)?;

    for schedule in &due_data {
        let following = next_run(&schedule.cron_spec()?, now, schedule.period_seconds)?;
        advance(tx, "data_schedule", schedule.id, following).await?;
        sqlx::query(
            "INSERT INTO data (metric_id, value, units, time, origin) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(schedule.metric_id)
        .bind(schedule.value)
        .bind(schedule.units.as_deref())
        .bind(now)
        .bind(Origin::Schedule.as_str())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        report.data_points += 1;

        debug!(
            subsystem = "scheduler",
            component = "recurrence",
            schedule_id = schedule.id,
            metric_id = schedule.metric_id,
            next_run = %following,
            "Generated scheduled data point"
        );
    }

    let due_occurrences: Vec<OccurrenceSchedule> = sqlx::query_as(
        "SELECT id, task_id, minute, hour, day_of_month, month, day_of_week,
                next_run, period_seconds, priority
         FROM occurrence_schedule
         WHERE next_run <= $1
         ORDER BY next_run, id
         FOR UPDATE SKIP LOCKED",
    )
    .bind(now)
    .fetch_all(&mut **tx)
    .await
    .map_err(Error::Database)?;

    for schedule in &due_occurrences {
        let following = next_run(&schedule.cron_spec()?, now, schedule.period_seconds)?;
        advance(tx, "occurrence_schedule", schedule.id, following).await?;
        sqlx::query(
            "INSERT INTO occurrence (task_id, priority, completed, time, origin)
             VALUES ($1, $2, FALSE, $3, $4)",
        )
        .bind(schedule.task_id)
        .bind(schedule.priority)
        .bind(now)
        .bind(Origin::Schedule.as_str())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        report.occurrences += 1;

        debug!(
            subsystem = "scheduler",
            component = "recurrence",
            schedule_id = schedule.id,
            task_id = schedule.task_id,
            next_run = %following,
            "Generated scheduled occurrence"
        );
    }

    Ok(report)
}

async fn advance(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    id: i64,
    following: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(&format!("UPDATE {table} SET next_run = $2 WHERE id = $1"))
        .bind(id)
        .bind(following)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

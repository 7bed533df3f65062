//! Data and occurrence schedules.
//!
//! A metric or task has at most one schedule. `next_run` is computed with the
//! cron evaluator on create and whenever a PATCH touches the cron fields or the
//! period; the recurrence generator advances it after that.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use jotter_core::{
    next_run, CreateDataScheduleRequest, CreateOccurrenceScheduleRequest, CronSpec, DataSchedule,
    Error, OccurrenceSchedule, Result, UpdateScheduleRequest,
};

use crate::trimmed;

const DATA_SCHEDULE_COLUMNS: &str = "s.id, s.metric_id, s.minute, s.hour, s.day_of_month, \
     s.month, s.day_of_week, s.next_run, s.period_seconds, s.value, s.units";

const OCCURRENCE_SCHEDULE_COLUMNS: &str = "s.id, s.task_id, s.minute, s.hour, s.day_of_month, \
     s.month, s.day_of_week, s.next_run, s.period_seconds, s.priority";

/// New cron fields, period and `next_run` after applying a PATCH.
struct Timing {
    spec: CronSpec,
    period_seconds: Option<i64>,
    next_run: DateTime<Utc>,
}

fn apply_timing(
    current: &CronSpec,
    current_period: Option<i64>,
    current_next_run: DateTime<Utc>,
    req: &UpdateScheduleRequest,
    now: DateTime<Utc>,
) -> Result<Timing> {
    let spec = req.cron.overlay(current)?;
    let period_seconds = req.period_seconds.unwrap_or(current_period);
    let next = if req.changes_timing() {
        next_run(&spec, now, period_seconds)?
    } else {
        current_next_run
    };
    Ok(Timing {
        spec,
        period_seconds,
        next_run: next,
    })
}

/// PostgreSQL schedule repository for both schedule kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgScheduleRepository;

impl PgScheduleRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    // DATA SCHEDULES
    // =========================================================================

    pub async fn get_data_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        metric_id: i64,
    ) -> Result<Option<DataSchedule>> {
        let sql = format!(
            "SELECT {DATA_SCHEDULE_COLUMNS} FROM data_schedule s
             JOIN metric m ON m.id = s.metric_id
             WHERE s.metric_id = $1 AND m.user_id = $2"
        );
        sqlx::query_as::<_, DataSchedule>(&sql)
            .bind(metric_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Attach a schedule to a metric. A second schedule for the same metric is
    /// a unique violation; a metric the caller does not own is `NotFound`.
    pub async fn create_data_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        metric_id: i64,
        req: &CreateDataScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<DataSchedule> {
        let spec = req.validate()?;
        let first_run = next_run(&spec, now, req.period_seconds)?;
        let sql = format!(
            "INSERT INTO data_schedule AS s
                 (metric_id, minute, hour, day_of_month, month, day_of_week,
                  next_run, period_seconds, value, units)
             SELECT m.id, $3, $4, $5, $6, $7, $8, $9, $10, $11
             FROM metric m WHERE m.id = $1 AND m.user_id = $2
             RETURNING {DATA_SCHEDULE_COLUMNS}"
        );
        sqlx::query_as::<_, DataSchedule>(&sql)
            .bind(metric_id)
            .bind(user_id)
            .bind(spec.minute.to_string())
            .bind(spec.hour.to_string())
            .bind(spec.day_of_month.to_string())
            .bind(spec.month.to_string())
            .bind(spec.day_of_week.to_string())
            .bind(first_run)
            .bind(req.period_seconds)
            .bind(req.value)
            .bind(trimmed(&req.units))
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("metric {metric_id}")))
    }

    pub async fn update_data_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        metric_id: i64,
        req: &UpdateScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<DataSchedule>> {
        req.validate()?;
        let sql = format!(
            "SELECT {DATA_SCHEDULE_COLUMNS} FROM data_schedule s
             JOIN metric m ON m.id = s.metric_id
             WHERE s.metric_id = $1 AND m.user_id = $2
             FOR UPDATE OF s"
        );
        let Some(current) = sqlx::query_as::<_, DataSchedule>(&sql)
            .bind(metric_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
        else {
            return Ok(None);
        };

        let timing = apply_timing(
            &current.cron_spec()?,
            current.period_seconds,
            current.next_run,
            req,
            now,
        )?;
        let sql = format!(
            "UPDATE data_schedule AS s
             SET minute = $2, hour = $3, day_of_month = $4, month = $5, day_of_week = $6,
                 next_run = $7, period_seconds = $8,
                 value = COALESCE($9, s.value), units = COALESCE($10, s.units)
             WHERE s.id = $1
             RETURNING {DATA_SCHEDULE_COLUMNS}"
        );
        sqlx::query_as::<_, DataSchedule>(&sql)
            .bind(current.id)
            .bind(timing.spec.minute.to_string())
            .bind(timing.spec.hour.to_string())
            .bind(timing.spec.day_of_month.to_string())
            .bind(timing.spec.month.to_string())
            .bind(timing.spec.day_of_week.to_string())
            .bind(timing.next_run)
            .bind(timing.period_seconds)
            .bind(req.value)
            .bind(trimmed(&req.units))
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn delete_data_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        metric_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM data_schedule s USING metric m
             WHERE m.id = s.metric_id AND s.metric_id = $1 AND m.user_id = $2",
        )
        .bind(metric_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // OCCURRENCE SCHEDULES
    // =========================================================================

    pub async fn get_occurrence_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        task_id: i64,
    ) -> Result<Option<OccurrenceSchedule>> {
        let sql = format!(
            "SELECT {OCCURRENCE_SCHEDULE_COLUMNS} FROM occurrence_schedule s
             JOIN task t ON t.id = s.task_id
             WHERE s.task_id = $1 AND t.user_id = $2"
        );
        sqlx::query_as::<_, OccurrenceSchedule>(&sql)
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn create_occurrence_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        task_id: i64,
        req: &CreateOccurrenceScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<OccurrenceSchedule> {
        let spec = req.validate()?;
        let first_run = next_run(&spec, now, req.period_seconds)?;
        let sql = format!(
            "INSERT INTO occurrence_schedule AS s
                 (task_id, minute, hour, day_of_month, month, day_of_week,
                  next_run, period_seconds, priority)
             SELECT t.id, $3, $4, $5, $6, $7, $8, $9, $10
             FROM task t WHERE t.id = $1 AND t.user_id = $2
             RETURNING {OCCURRENCE_SCHEDULE_COLUMNS}"
        );
        sqlx::query_as::<_, OccurrenceSchedule>(&sql)
            .bind(task_id)
            .bind(user_id)
            .bind(spec.minute.to_string())
            .bind(spec.hour.to_string())
            .bind(spec.day_of_month.to_string())
            .bind(spec.month.to_string())
            .bind(spec.day_of_week.to_string())
            .bind(first_run)
            .bind(req.period_seconds)
            .bind(req.priority.unwrap_or(0))
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    pub async fn update_occurrence_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        task_id: i64,
        req: &UpdateScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<OccurrenceSchedule>> {
        req.validate()?;
        let sql = format!(
            "SELECT {OCCURRENCE_SCHEDULE_COLUMNS} FROM occurrence_schedule s
             JOIN task t ON t.id = s.task_id
             WHERE s.task_id = $1 AND t.user_id = $2
             FOR UPDATE OF s"
        );
        let Some(current) = sqlx::query_as::<_, OccurrenceSchedule>(&sql)
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
        else {
            return Ok(None);
        };

        let timing = apply_timing(
            &current.cron_spec()?,
            current.period_seconds,
            current.next_run,
            req,
            now,
        )?;
        let sql = format!(
            "UPDATE occurrence_schedule AS s
             SET minute = $2, hour = $3, day_of_month = $4, month = $5, day_of_week = $6,
                 next_run = $7, period_seconds = $8, priority = COALESCE($9, s.priority)
             WHERE s.id = $1
             RETURNING {OCCURRENCE_SCHEDULE_COLUMNS}"
        );
        sqlx::query_as::<_, OccurrenceSchedule>(&sql)
            .bind(current.id)
            .bind(timing.spec.minute.to_string())
            .bind(timing.spec.hour.to_string())
            .bind(timing.spec.day_of_month.to_string())
            .bind(timing.spec.month.to_string())
            .bind(timing.spec.day_of_week.to_string())
            .bind(timing.next_run)
            .bind(timing.period_seconds)
            .bind(req.priority)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn delete_occurrence_schedule_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        task_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM occurrence_schedule s USING task t
             WHERE t.id = s.task_id AND s.task_id = $1 AND t.user_id = $2",
        )
        .bind(task_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

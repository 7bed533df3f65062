//! Data point repository. Ownership is reached through the parent metric.

use chrono::Utc;
use sqlx::{Postgres, Transaction};

use jotter_core::{
    CreateDataRequest, DataPoint, EntityFilter, Error, Origin, Result, TimeRange,
    UpdateDataRequest,
};

use crate::query::{fetch_page, EntityShape};
use crate::trimmed;

pub(crate) const DATA_COLUMNS: &str =
    "d.id, d.metric_id, d.value, d.units, d.time, d.origin, d.note_id";

const DATA_SHAPE: EntityShape = EntityShape {
    from: "data d JOIN metric m ON m.id = d.metric_id",
    id_column: "d.id",
    owner_column: "m.user_id",
    parent_column: Some("d.metric_id"),
    time_column: Some("d.time"),
    text_columns: &["d.units"],
    tag_join: None,
    name_column: None,
};

/// PostgreSQL data point repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDataRepository;

impl PgDataRepository {
    pub fn new() -> Self {
        Self
    }

    /// Record a value under `metric_id`; a metric the caller does not own is `NotFound`.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        metric_id: i64,
        req: &CreateDataRequest,
        origin: Origin,
        note_id: Option<i64>,
    ) -> Result<DataPoint> {
        req.validate()?;
        let sql = format!(
            "INSERT INTO data AS d (metric_id, value, units, time, origin, note_id)
             SELECT m.id, $3, $4, $5, $6, $7 FROM metric m WHERE m.id = $1 AND m.user_id = $2
             RETURNING {DATA_COLUMNS}"
        );
        sqlx::query_as::<_, DataPoint>(&sql)
            .bind(metric_id)
            .bind(user_id)
            .bind(req.value)
            .bind(trimmed(&req.units))
            .bind(req.time.unwrap_or_else(Utc::now))
            .bind(origin.as_str())
            .bind(note_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("metric {metric_id}")))
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<DataPoint>> {
        let sql = format!(
            "SELECT {DATA_COLUMNS} FROM data d JOIN metric m ON m.id = d.metric_id
             WHERE d.id = $1 AND m.user_id = $2"
        );
        sqlx::query_as::<_, DataPoint>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn list_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: &EntityFilter,
    ) -> Result<(Vec<DataPoint>, i64)> {
        fetch_page(tx, &DATA_SHAPE, DATA_COLUMNS, filter).await
    }

    /// Every data point of `metric_ids` inside `range`, newest first.
    ///
    /// Callers pass ids they already resolved through an owner-scoped query.
    pub async fn for_metrics_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        metric_ids: &[i64],
        range: &TimeRange,
    ) -> Result<Vec<DataPoint>> {
        if metric_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {DATA_COLUMNS} FROM data d
             WHERE d.metric_id = ANY($1) AND d.time >= $2 AND d.time <= $3
             ORDER BY d.time DESC, d.id DESC"
        );
        sqlx::query_as::<_, DataPoint>(&sql)
            .bind(metric_ids)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        req: &UpdateDataRequest,
    ) -> Result<Option<DataPoint>> {
        req.validate()?;
        let sql = format!(
            "UPDATE data AS d
             SET value = COALESCE($3, d.value),
                 units = COALESCE($4, d.units),
                 time = COALESCE($5, d.time)
             FROM metric m
             WHERE m.id = d.metric_id AND d.id = $1 AND m.user_id = $2
             RETURNING {DATA_COLUMNS}"
        );
        sqlx::query_as::<_, DataPoint>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(req.value)
            .bind(trimmed(&req.units))
            .bind(req.time)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM data d USING metric m
             WHERE m.id = d.metric_id AND d.id = $1 AND m.user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

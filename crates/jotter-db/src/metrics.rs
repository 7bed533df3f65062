//! Metric repository.
//!
//! Metrics are keyed per user by their normalized name. Listing a metric
//! embeds the data points that fall inside the request's time window; the
//! metric rows themselves are never time-filtered.

use std::collections::HashMap;

use sqlx::{Postgres, Transaction};

use jotter_core::{
    display_name, normalize_name, CreateMetricRequest, EntityFilter, Error, Metric, Result,
    TagTarget, TimeRange, UpdateMetricRequest,
};

use crate::data::PgDataRepository;
use crate::query::{fetch_page, EntityShape};
use crate::tags::PgTagRepository;

const METRIC_COLUMNS: &str = "m.id, m.user_id, m.name, m.display_name, m.tagged, m.created_at, \
     ARRAY(SELECT tg.name FROM metric_tag mt JOIN tag tg ON tg.id = mt.tag_id \
           WHERE mt.metric_id = m.id ORDER BY tg.name) AS tags";

const METRIC_SHAPE: EntityShape = EntityShape {
    from: "metric m",
    id_column: "m.id",
    owner_column: "m.user_id",
    parent_column: None,
    time_column: None,
    text_columns: &["m.name", "m.display_name"],
    tag_join: Some(("metric_tag", "metric_id")),
    name_column: Some("m.name"),
};

/// PostgreSQL metric repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgMetricRepository;

impl PgMetricRepository {
    pub fn new() -> Self {
        Self
    }

    /// Create a metric; a second metric with the same normalized name is a unique violation.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        req: &CreateMetricRequest,
    ) -> Result<Metric> {
        req.validate()?;
        let raw = req.name.as_deref().unwrap_or_default();
        let name = require_name(raw)?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO metric (user_id, name, display_name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(&name)
        .bind(display_name(raw))
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Metric(id)])
                .await?;
        }
        self.fetch_one(tx, user_id, id)
            .await?
            .ok_or_else(|| Error::Internal(format!("metric {id} vanished after insert")))
    }

    /// Resolve a metric by name for the pipeline, creating it when missing.
    pub async fn find_or_create_by_name_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        raw_name: &str,
    ) -> Result<i64> {
        let name = require_name(raw_name)?;
        sqlx::query(
            "INSERT INTO metric (user_id, name, display_name) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, name) DO NOTHING",
        )
        .bind(user_id)
        .bind(&name)
        .bind(display_name(raw_name))
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query_scalar("SELECT id FROM metric WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(&name)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Fetch one metric with its data points inside `range`.
    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        range: &TimeRange,
    ) -> Result<Option<Metric>> {
        let Some(mut metric) = self.fetch_one(tx, user_id, id).await? else {
            return Ok(None);
        };
        metric.data = PgDataRepository
            .for_metrics_tx(tx, &[metric.id], range)
            .await?;
        Ok(Some(metric))
    }

    pub async fn list_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: &EntityFilter,
    ) -> Result<(Vec<Metric>, i64)> {
        let (mut metrics, total): (Vec<Metric>, i64) =
            fetch_page(tx, &METRIC_SHAPE, METRIC_COLUMNS, filter).await?;
        let ids: Vec<i64> = metrics.iter().map(|m| m.id).collect();

        let mut by_metric: HashMap<i64, Vec<_>> = HashMap::new();
        for point in PgDataRepository
            .for_metrics_tx(tx, &ids, &filter.time_range)
            .await?
        {
            by_metric.entry(point.metric_id).or_default().push(point);
        }
        for metric in &mut metrics {
            metric.data = by_metric.remove(&metric.id).unwrap_or_default();
        }
        Ok((metrics, total))
    }

    /// Metrics that received data from `note_id` and still need tags.
    pub async fn untagged_for_note(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: i64,
    ) -> Result<Vec<Metric>> {
        let sql = format!(
            "SELECT {METRIC_COLUMNS} FROM metric m
             WHERE NOT m.tagged
               AND EXISTS (SELECT 1 FROM data d WHERE d.metric_id = m.id AND d.note_id = $1)
             ORDER BY m.id"
        );
        sqlx::query_as::<_, Metric>(&sql)
            .bind(note_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Rename and/or retag a metric; `None` when not found or not owned.
    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        req: &UpdateMetricRequest,
    ) -> Result<Option<Metric>> {
        req.validate()?;
        let (name, display) = match req.name.as_deref() {
            Some(raw) => (Some(require_name(raw)?), Some(display_name(raw))),
            None => (None, None),
        };
        let result = sqlx::query(
            "UPDATE metric
             SET name = COALESCE($3, name), display_name = COALESCE($4, display_name)
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(display)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Metric(id)])
                .await?;
        }
        self.fetch_one(tx, user_id, id).await
    }

    /// Delete a metric; its data points and schedule cascade.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM metric WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_one(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Metric>> {
        let sql =
            format!("SELECT {METRIC_COLUMNS} FROM metric m WHERE m.id = $1 AND m.user_id = $2");
        sqlx::query_as::<_, Metric>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }
}

fn require_name(raw_name: &str) -> Result<String> {
    normalize_name(raw_name)
        .ok_or_else(|| Error::InvalidInput("name must contain a letter or digit".into()))
}

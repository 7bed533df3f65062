//! Occurrence repository.
//!
//! Occurrences have no owner column of their own; ownership is reached through
//! the parent task, so every query joins `task`.

use chrono::Utc;
use sqlx::{Postgres, Transaction};

use jotter_core::{
    CreateOccurrenceRequest, EntityFilter, Error, Occurrence, Origin, Result,
    UpdateOccurrenceRequest,
};

use crate::query::{fetch_page, EntityShape};

const OCCURRENCE_COLUMNS: &str =
    "o.id, o.task_id, o.priority, o.completed, o.time, o.origin, o.note_id";

const OCCURRENCE_SHAPE: EntityShape = EntityShape {
    from: "occurrence o JOIN task t ON t.id = o.task_id",
    id_column: "o.id",
    owner_column: "t.user_id",
    parent_column: Some("o.task_id"),
    time_column: Some("o.time"),
    text_columns: &[],
    tag_join: None,
    name_column: None,
};

/// PostgreSQL occurrence repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgOccurrenceRepository;

impl PgOccurrenceRepository {
    pub fn new() -> Self {
        Self
    }

    /// Insert an occurrence under `task_id`; a task the caller does not own is `NotFound`.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        task_id: i64,
        req: &CreateOccurrenceRequest,
        origin: Origin,
        note_id: Option<i64>,
    ) -> Result<Occurrence> {
        let sql = format!(
            "INSERT INTO occurrence AS o (task_id, priority, completed, time, origin, note_id)
             SELECT t.id, $3, $4, $5, $6, $7 FROM task t WHERE t.id = $1 AND t.user_id = $2
             RETURNING {OCCURRENCE_COLUMNS}"
        );
        sqlx::query_as::<_, Occurrence>(&sql)
            .bind(task_id)
            .bind(user_id)
            .bind(req.priority.unwrap_or(0))
            .bind(req.completed.unwrap_or(false))
            .bind(req.time.unwrap_or_else(Utc::now))
            .bind(origin.as_str())
            .bind(note_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Occurrence>> {
        let sql = format!(
            "SELECT {OCCURRENCE_COLUMNS} FROM occurrence o JOIN task t ON t.id = o.task_id
             WHERE o.id = $1 AND t.user_id = $2"
        );
        sqlx::query_as::<_, Occurrence>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// List occurrences; the filter's parent id selects a task.
    pub async fn list_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        filter: &EntityFilter,
    ) -> Result<(Vec<Occurrence>, i64)> {
        fetch_page(tx, &OCCURRENCE_SHAPE, OCCURRENCE_COLUMNS, filter).await
    }

    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        req: &UpdateOccurrenceRequest,
    ) -> Result<Option<Occurrence>> {
        let sql = format!(
            "UPDATE occurrence AS o
             SET priority = COALESCE($3, o.priority),
                 completed = COALESCE($4, o.completed),
                 time = COALESCE($5, o.time)
             FROM task t
             WHERE t.id = o.task_id AND o.id = $1 AND t.user_id = $2
             RETURNING {OCCURRENCE_COLUMNS}"
        );
        sqlx::query_as::<_, Occurrence>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(req.priority)
            .bind(req.completed)
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
            "DELETE FROM occurrence o USING task t
             WHERE t.id = o.task_id AND o.id = $1 AND t.user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

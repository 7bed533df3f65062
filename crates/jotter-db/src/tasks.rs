//! Task repository.

use sqlx::{Postgres, Transaction};

use jotter_core::{
    CreateTaskRequest, EntityFilter, Error, Result, TagTarget, Task, UpdateTaskRequest,
};

use crate::query::{fetch_page, EntityShape};
use crate::tags::PgTagRepository;
use crate::trimmed;

const TASK_COLUMNS: &str = "t.id, t.user_id, t.note_id, t.summary, t.description, t.tagged, \
     t.created_at, \
     ARRAY(SELECT tg.name FROM task_tag tt JOIN tag tg ON tg.id = tt.tag_id \
           WHERE tt.task_id = t.id ORDER BY tg.name) AS tags";

const TASK_SHAPE: EntityShape = EntityShape {
    from: "task t",
    id_column: "t.id",
    owner_column: "t.user_id",
    parent_column: Some("t.note_id"),
    time_column: Some("t.created_at"),
    text_columns: &["t.summary", "t.description"],
    tag_join: Some(("task_tag", "task_id")),
    name_column: None,
};

/// PostgreSQL task repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTaskRepository;

impl PgTaskRepository {
    pub fn new() -> Self {
        Self
    }

    /// Insert a task and assign its tags. A `note_id` the caller does not own is `NotFound`.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        req: &CreateTaskRequest,
    ) -> Result<Task> {
        req.validate()?;
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO task (user_id, note_id, summary, description)
             SELECT $1, $2, $3, $4
             WHERE $2::bigint IS NULL
                OR EXISTS (SELECT 1 FROM note WHERE id = $2 AND user_id = $1)
             RETURNING id",
        )
        .bind(user_id)
        .bind(req.note_id)
        .bind(trimmed(&req.summary))
        .bind(trimmed(&req.description))
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let id = id.ok_or_else(|| {
            Error::NotFound(format!("note {}", req.note_id.unwrap_or_default()))
        })?;

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Task(id)])
                .await?;
        }

        self.get_tx(tx, user_id, id)
            .await?
            .ok_or_else(|| Error::Internal(format!("task {id} vanished after insert")))
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task t WHERE t.id = $1 AND t.user_id = $2");
        sqlx::query_as::<_, Task>(&sql)
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
    ) -> Result<(Vec<Task>, i64)> {
        fetch_page(tx, &TASK_SHAPE, TASK_COLUMNS, filter).await
    }

    /// Tasks derived from a note that still need tags.
    pub async fn untagged_for_note(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: i64,
    ) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task t WHERE t.note_id = $1 AND NOT t.tagged ORDER BY t.id"
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(note_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Apply the fields present in `req`; `None` when not found or not owned.
    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        req: &UpdateTaskRequest,
    ) -> Result<Option<Task>> {
        req.validate()?;
        let result = sqlx::query(
            "UPDATE task
             SET summary = COALESCE($3, summary),
                 description = COALESCE($4, description)
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(trimmed(&req.summary))
        .bind(req.description.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Task(id)])
                .await?;
        }
        self.get_tx(tx, user_id, id).await
    }

    /// Delete a task; its occurrences and schedule cascade.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM task WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

//! Tag repository and the tag merge routine.
//!
//! Tags are per-user and keyed by their normalized name. Assigning tags to a
//! task, link or metric always *replaces* that entity's tag set, so running
//! the same assignment twice leaves exactly one copy of each tag.

use std::time::Instant;

use sqlx::{Postgres, Transaction};
use tracing::debug;

use jotter_core::defaults::MAX_TAGS_PER_REQUEST;
use jotter_core::{
    display_name, normalize_all, normalize_name, EntityFilter, Error, Result, Tag, TagTarget,
};

use crate::query::{fetch_page, EntityShape};

const TAG_COLUMNS: &str = "tg.id, tg.user_id, tg.name, tg.display_name, tg.created_at";

const TAG_SHAPE: EntityShape = EntityShape {
    from: "tag tg",
    id_column: "tg.id",
    owner_column: "tg.user_id",
    parent_column: None,
    time_column: None,
    text_columns: &["tg.name", "tg.display_name"],
    tag_join: None,
    name_column: Some("tg.name"),
};

/// PostgreSQL tag repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTagRepository;

impl PgTagRepository {
    pub fn new() -> Self {
        Self
    }

    /// Create one tag explicitly; a duplicate normalized name is a unique violation.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        raw_name: &str,
    ) -> Result<Tag> {
        let name = require_name(raw_name)?;
        let sql = format!(
            "INSERT INTO tag AS tg (user_id, name, display_name) VALUES ($1, $2, $3)
             RETURNING {TAG_COLUMNS}"
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(user_id)
            .bind(&name)
            .bind(display_name(raw_name))
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Tag>> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tag tg WHERE tg.id = $1 AND tg.user_id = $2");
        sqlx::query_as::<_, Tag>(&sql)
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
    ) -> Result<(Vec<Tag>, i64)> {
        fetch_page(tx, &TAG_SHAPE, TAG_COLUMNS, filter).await
    }

    /// Rename a tag; `None` when not found or not owned.
    pub async fn rename_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        raw_name: &str,
    ) -> Result<Option<Tag>> {
        let name = require_name(raw_name)?;
        let sql = format!(
            "UPDATE tag AS tg SET name = $3, display_name = $4
             WHERE tg.id = $1 AND tg.user_id = $2
             RETURNING {TAG_COLUMNS}"
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(&name)
            .bind(display_name(raw_name))
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Delete a tag; its assignments cascade.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tag WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve candidate names to tag rows, creating the missing ones.
    ///
    /// Concurrent callers converge on a single row per `(user, name)` via the
    /// unique constraint and `ON CONFLICT DO NOTHING`.
    pub async fn upsert_names_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        candidate_names: &[String],
    ) -> Result<Vec<Tag>> {
        let normalized = normalize_all(candidate_names);
        if normalized.len() > MAX_TAGS_PER_REQUEST {
            return Err(Error::InvalidInput(format!(
                "at most {MAX_TAGS_PER_REQUEST} tags per request"
            )));
        }
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let (names, displays): (Vec<String>, Vec<String>) = normalized.into_iter().unzip();

        sqlx::query(
            "INSERT INTO tag (user_id, name, display_name)
             SELECT $1, n, d FROM unnest($2::text[], $3::text[]) AS x(n, d)
             ON CONFLICT (user_id, name) DO NOTHING",
        )
        .bind(user_id)
        .bind(&names)
        .bind(&displays)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let sql = format!(
            "SELECT {TAG_COLUMNS} FROM tag tg
             WHERE tg.user_id = $1 AND tg.name = ANY($2)
             ORDER BY tg.name"
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(user_id)
            .bind(&names)
            .fetch_all(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Replace the tag set of every target with the tags for `candidate_names`.
    ///
    /// Each target must belong to `user_id`; otherwise the call fails with
    /// `NotFound` and the caller's transaction should be dropped.
    pub async fn merge_tags(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        candidate_names: &[String],
        targets: &[TagTarget],
    ) -> Result<Vec<Tag>> {
        let start = Instant::now();
        let tags = self.upsert_names_tx(tx, user_id, candidate_names).await?;
        let tag_ids: Vec<i64> = tags.iter().map(|t| t.id).collect();

        for target in targets {
            replace_target_tags(tx, user_id, *target, &tag_ids).await?;
        }

        debug!(
            subsystem = "db",
            component = "tag_merge",
            op = "merge_tags",
            user_id,
            result_count = tags.len(),
            targets = targets.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Merged tags"
        );
        Ok(tags)
    }

    /// Per-entity form of [`merge_tags`](Self::merge_tags): each target gets its own set.
    pub async fn assign_tags(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        assignments: &[(TagTarget, Vec<String>)],
    ) -> Result<()> {
        for (target, names) in assignments {
            self.merge_tags(tx, user_id, names, std::slice::from_ref(target))
                .await?;
        }
        Ok(())
    }
}

async fn replace_target_tags(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    target: TagTarget,
    tag_ids: &[i64],
) -> Result<()> {
    let (table, join_table, column) = match target {
        TagTarget::Task(_) => ("task", "task_tag", "task_id"),
        TagTarget::Link(_) => ("link", "link_tag", "link_id"),
        TagTarget::Metric(_) => ("metric", "metric_tag", "metric_id"),
    };
    let id = target.id();

    // Ownership check doubles as the row lock for the replacement.
    let owned = sqlx::query(&format!(
        "UPDATE {table} SET tagged = TRUE WHERE id = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;
    if owned.rows_affected() == 0 {
        return Err(Error::NotFound(target.to_string()));
    }

    sqlx::query(&format!("DELETE FROM {join_table} WHERE {column} = $1"))
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

    if !tag_ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {join_table} ({column}, tag_id)
             SELECT $1, unnest($2::bigint[])
             ON CONFLICT DO NOTHING"
        ))
        .bind(id)
        .bind(tag_ids)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}

fn require_name(raw_name: &str) -> Result<String> {
    normalize_name(raw_name)
        .ok_or_else(|| Error::InvalidInput("name must contain a letter or digit".into()))
}

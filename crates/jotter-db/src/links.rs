//! Link repository.

use sqlx::{Postgres, Transaction};

use jotter_core::{
    CreateLinkRequest, EntityFilter, Error, Link, Result, TagTarget, UpdateLinkRequest,
};

use crate::query::{fetch_page, EntityShape};
use crate::tags::PgTagRepository;
use crate::trimmed;

const LINK_COLUMNS: &str = "l.id, l.user_id, l.note_id, l.url, l.description, l.tagged, \
     l.created_at, \
     ARRAY(SELECT tg.name FROM link_tag lt JOIN tag tg ON tg.id = lt.tag_id \
           WHERE lt.link_id = l.id ORDER BY tg.name) AS tags";

const LINK_SHAPE: EntityShape = EntityShape {
    from: "link l",
    id_column: "l.id",
    owner_column: "l.user_id",
    parent_column: Some("l.note_id"),
    time_column: Some("l.created_at"),
    text_columns: &["l.url", "l.description"],
    tag_join: Some(("link_tag", "link_id")),
    name_column: None,
};

/// PostgreSQL link repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgLinkRepository;

impl PgLinkRepository {
    pub fn new() -> Self {
        Self
    }

    /// Insert a link and assign its tags. A `note_id` the caller does not own is `NotFound`.
    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        req: &CreateLinkRequest,
    ) -> Result<Link> {
        req.validate()?;
        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO link (user_id, note_id, url, description)
             SELECT $1, $2, $3, $4
             WHERE $2::bigint IS NULL
                OR EXISTS (SELECT 1 FROM note WHERE id = $2 AND user_id = $1)
             RETURNING id",
        )
        .bind(user_id)
        .bind(req.note_id)
        .bind(trimmed(&req.url))
        .bind(trimmed(&req.description))
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)?;

        let id = id.ok_or_else(|| {
            Error::NotFound(format!("note {}", req.note_id.unwrap_or_default()))
        })?;

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Link(id)])
                .await?;
        }

        self.get_tx(tx, user_id, id)
            .await?
            .ok_or_else(|| Error::Internal(format!("link {id} vanished after insert")))
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Link>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM link l WHERE l.id = $1 AND l.user_id = $2");
        sqlx::query_as::<_, Link>(&sql)
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
    ) -> Result<(Vec<Link>, i64)> {
        fetch_page(tx, &LINK_SHAPE, LINK_COLUMNS, filter).await
    }

    /// Links derived from a note that still need tags.
    pub async fn untagged_for_note(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        note_id: i64,
    ) -> Result<Vec<Link>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM link l WHERE l.note_id = $1 AND NOT l.tagged ORDER BY l.id"
        );
        sqlx::query_as::<_, Link>(&sql)
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
        req: &UpdateLinkRequest,
    ) -> Result<Option<Link>> {
        req.validate()?;
        let result = sqlx::query(
            "UPDATE link
             SET url = COALESCE($3, url),
                 description = COALESCE($4, description)
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(trimmed(&req.url))
        .bind(req.description.as_deref())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &req.tags {
            PgTagRepository
                .merge_tags(tx, user_id, tags, &[TagTarget::Link(id)])
                .await?;
        }
        self.get_tx(tx, user_id, id).await
    }

    /// Delete a link; its tag assignments cascade.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM link WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

//! Note repository.
//!
//! API-facing methods are owner-scoped. The `*_for_pipeline` methods address a
//! note by id alone; they are only reachable from job handlers, which carry a
//! note id produced by the API after the ownership check.

use sqlx::{Postgres, Transaction};

use jotter_core::{CreateNoteRequest, EntityFilter, Error, Note, Result, UpdateNoteRequest};

use crate::query::{fetch_page, EntityShape};
use crate::trimmed;

const NOTE_COLUMNS: &str = "n.id, n.user_id, n.text, n.audio_key, n.image_key, \
     n.audio_transcript, n.image_description, n.image_text, \
     n.audio_processed, n.image_processed, n.text_processed, n.created_at";

pub(crate) const NOTE_SHAPE: EntityShape = EntityShape {
    from: "note n",
    id_column: "n.id",
    owner_column: "n.user_id",
    parent_column: None,
    time_column: Some("n.created_at"),
    text_columns: &[
        "n.text",
        "n.audio_transcript",
        "n.image_description",
        "n.image_text",
    ],
    tag_join: None,
    name_column: None,
};

/// PostgreSQL note repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgNoteRepository;

impl PgNoteRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        req: &CreateNoteRequest,
    ) -> Result<Note> {
        req.validate()?;
        let sql = format!(
            "INSERT INTO note AS n (user_id, text, audio_key, image_key)
             VALUES ($1, $2, $3, $4)
             RETURNING {NOTE_COLUMNS}"
        );
        sqlx::query_as::<_, Note>(&sql)
            .bind(user_id)
            .bind(trimmed(&req.text))
            .bind(trimmed(&req.audio_key))
            .bind(trimmed(&req.image_key))
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM note n WHERE n.id = $1 AND n.user_id = $2");
        sqlx::query_as::<_, Note>(&sql)
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
    ) -> Result<(Vec<Note>, i64)> {
        fetch_page(tx, &NOTE_SHAPE, NOTE_COLUMNS, filter).await
    }

    /// Apply the fields present in `req`; `None` when not found or not owned.
    pub async fn update_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
        req: &UpdateNoteRequest,
    ) -> Result<Option<Note>> {
        req.validate()?;
        let sql = format!(
            "UPDATE note AS n SET text = COALESCE($3, n.text)
             WHERE n.id = $1 AND n.user_id = $2
             RETURNING {NOTE_COLUMNS}"
        );
        sqlx::query_as::<_, Note>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(trimmed(&req.text))
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Delete a note; tasks, links, data points and occurrences derived from it cascade.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Lock a note for a pipeline stage; `None` if it was deleted meanwhile.
    pub async fn lock_for_pipeline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM note n WHERE n.id = $1 FOR UPDATE");
        sqlx::query_as::<_, Note>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Store a transcript and mark the audio stage done; `None` records that
    /// no transcript could be produced.
    pub async fn set_transcript_for_pipeline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        transcript: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE note SET audio_transcript = $2, audio_processed = TRUE WHERE id = $1",
        )
        .bind(id)
        .bind(transcript)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn set_image_description_for_pipeline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        description: Option<&str>,
        image_text: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE note
             SET image_description = $2, image_text = $3, image_processed = TRUE
             WHERE id = $1",
        )
        .bind(id)
        .bind(description)
        .bind(image_text)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn mark_text_processed_for_pipeline(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE note SET text_processed = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

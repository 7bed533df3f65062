//! User resolution and account deletion.

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use jotter_core::{Error, Result, User};

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Map an external identity to an internal user id.
    ///
    /// With `auto_create` the row is inserted on first sight; concurrent first
    /// requests for the same identity converge on one row. Returns `None` when
    /// the identity is unknown and `auto_create` is off.
    pub async fn resolve(&self, external_id: &str, auto_create: bool) -> Result<Option<i64>> {
        if let Some(id) = self.find_by_external_id(external_id).await? {
            return Ok(Some(id));
        }
        if !auto_create {
            return Ok(None);
        }

        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO app_user (external_id) VALUES ($1)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING id",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match inserted {
            Some(id) => {
                info!(
                    subsystem = "db",
                    component = "users",
                    op = "create",
                    user_id = id,
                    "Created user on first request"
                );
                Ok(Some(id))
            }
            // Lost the race to a concurrent insert
            None => self.find_by_external_id(external_id).await,
        }
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM app_user WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT id, external_id, parent_id, created_at FROM app_user WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(Error::Database)
    }

    /// Delete the account; every owned row cascades.
    pub async fn delete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM app_user WHERE id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        debug!(
            subsystem = "db",
            component = "users",
            op = "delete",
            user_id,
            rows_affected = result.rows_affected(),
            "Deleted user"
        );
        Ok(result.rows_affected() > 0)
    }
}

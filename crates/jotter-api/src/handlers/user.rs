//! The caller's own account.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::info;

use crate::auth::AuthUser;
use crate::handlers::{deleted, found};
use crate::{response, ApiError, AppState};

pub async fn get_user(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut tx = state.db.begin().await?;
    let user = state.db.users.get_tx(&mut tx, auth.user_id).await?;
    tx.commit().await?;
    Ok(response::item(found(user, "user")?))
}

/// Delete the caller and, by cascade, everything they own.
///
/// With `AUTO_CREATE_USERS` on, the next request carrying the same subject
/// starts over with an empty account.
pub async fn delete_user(auth: AuthUser, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let mut tx = state.db.begin().await?;
    let matched = state.db.users.delete_tx(&mut tx, auth.user_id).await?;
    tx.commit().await?;
    if matched {
        info!(subsystem = "api", user_id = auth.user_id, "User deleted");
    }
    deleted(matched, "user")
}

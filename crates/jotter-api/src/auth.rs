//! Caller identity.
//!
//! The gateway in front of the API verifies the bearer token and forwards the
//! subject in a trusted header (`IDENTITY_HEADER`). This extractor maps that
//! subject to an internal user id.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;

use crate::{ApiError, AppState};

/// Authenticated caller.
///
/// ```ignore
/// async fn list_tasks(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
///     let filter = EntityFilter::for_owner(auth.user_id, Utc::now());
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub subject: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(&state.config.identity_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))?;

        let user_id = state
            .db
            .users
            .resolve(subject, state.config.auto_create_users)
            .await?
            .ok_or_else(|| {
                debug!(subsystem = "api", component = "auth", "Unknown subject rejected");
                ApiError::Unauthorized("unknown user".into())
            })?;

        Ok(AuthUser {
            user_id,
            subject: subject.to_string(),
        })
    }
}

//! HTTP handlers, one module per resource.

pub mod data;
pub mod health;
pub mod links;
pub mod metrics;
pub mod notes;
pub mod occurrences;
pub mod schedules;
pub mod tags;
pub mod tasks;
pub mod upload;
pub mod user;

use std::fmt::Display;

use axum::http::StatusCode;

use crate::ApiError;

/// Turn an owner-scoped lookup into the resource or a 404.
pub(crate) fn found<T>(value: Option<T>, what: impl Display) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::not_found(what))
}

/// 204 when the owner-scoped delete matched a row, 404 otherwise.
pub(crate) fn deleted(matched: bool, what: impl Display) -> Result<StatusCode, ApiError> {
    if matched {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(what))
    }
}

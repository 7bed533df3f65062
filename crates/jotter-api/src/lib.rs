//! # jotter-api
//!
//! HTTP surface for jotter: owner-scoped CRUD over notes, tasks,
//! occurrences, links, metrics, data points, tags and schedules, plus media
//! upload. The binary in `main.rs` wires this router to the database, the
//! object store, the pipeline worker and the periodic scheduler.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod query;
pub mod response;
pub mod routes;
pub mod state;

pub use auth::AuthUser;
pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

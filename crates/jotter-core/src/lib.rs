//! # jotter-core
//!
//! Core types, pure logic, and trait definitions shared by every jotter crate:
//! domain models, the owner-scoped list filter, name normalization, the cron
//! evaluator, and the error type.

pub mod cron;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod models;
pub mod normalize;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use cron::{next_run, CronField, CronSpec};
pub use error::{Error, Result};
pub use filter::{EntityFilter, Page, TimeRange};
pub use models::*;
pub use normalize::{display_name, normalize_all, normalize_name};
pub use traits::*;
pub use uuid_utils::{extract_timestamp, new_v7};

//! # jotter-inference
//!
//! Model backends used by the note pipeline.
//!
//! This crate provides:
//! - Ollama generation backend (chat API, JSON output) implementing
//!   [`jotter_core::GenerationBackend`]
//! - Vision backend for image description
//! - Transcription backend for audio-to-text
//! - Prompts and tolerant parsing of model output into extracted entities
//!   and tag assignments
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable the Ollama generation backend
//! - `mock`: Deterministic in-process backends for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use jotter_inference::{extraction, OllamaBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let found = extraction::extract_entities(&backend, "Resting heart rate 58 bpm")
//!         .await
//!         .unwrap();
//!     println!("{} metrics", found.metrics.len());
//! }
//! ```

pub mod extraction;
pub mod transcription;
pub mod vision;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use jotter_core::*;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

pub use extraction::{
    Extraction, ExtractedLink, ExtractedMetric, ExtractedTask, TagAssignment, TagCandidate,
};
pub use transcription::{Transcript, TranscriptionBackend, WhisperBackend};
pub use vision::{ImageDescription, OllamaVisionBackend, VisionBackend};

//! Mock inference backend for deterministic testing.
//!
//! One value implements every backend trait the pipeline uses, so a test can
//! hand the same instance to each stage and assert on the shared call log.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jotter_inference::mock::MockInferenceBackend;
//! use jotter_inference::GenerationBackend;
//!
//! #[tokio::test]
//! async fn test_with_mock_backend() {
//!     let backend = MockInferenceBackend::new().with_fixed_response(r#"{"metrics": []}"#);
//!     let reply = backend.generate("ran 5k").await.unwrap();
//!     assert_eq!(reply, r#"{"metrics": []}"#);
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use jotter_core::{Error, GenerationBackend, Result};

use crate::transcription::{Transcript, TranscriptionBackend};
use crate::vision::VisionBackend;

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    /// Generation replies keyed by system prompt.
    system_responses: HashMap<String, String>,
    default_response: String,
    vision_response: String,
    transcript: String,
    latency_ms: u64,
    failure_rate: f64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            system_responses: HashMap::new(),
            default_response: "{}".to_string(),
            vision_response: "An image.\nTEXT: none".to_string(),
            transcript: "Mock transcript".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set a fixed response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Reply with `output` whenever the system prompt equals `system`.
    pub fn with_system_response(
        mut self,
        system: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .system_responses
            .insert(system.into(), output.into());
        self
    }

    pub fn with_vision_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).vision_response = response.into();
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).transcript = transcript.into();
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Get number of generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.call_count("generate")
    }

    fn log_call(&self, operation: &str, input: &str) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                operation: operation.to_string(),
                input: input.to_string(),
                timestamp: std::time::Instant::now(),
            });
        }
    }

    /// Log, sleep, and roll for a simulated failure.
    async fn begin(&self, operation: &str, input: &str) -> Result<()> {
        use rand::Rng;
        self.log_call(operation, input);
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
        if self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
        {
            return Err(Error::Inference(format!("simulated {operation} failure")));
        }
        Ok(())
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.begin("generate", prompt).await?;
        Ok(self
            .config
            .system_responses
            .get(system)
            .unwrap_or(&self.config.default_response)
            .clone())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[async_trait]
impl VisionBackend for MockInferenceBackend {
    async fn describe_image(&self, image: &[u8], mime_type: &str, _prompt: &str) -> Result<String> {
        self.begin("describe_image", &format!("{mime_type}:{}", image.len()))
            .await?;
        Ok(self.config.vision_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}

#[async_trait]
impl TranscriptionBackend for MockInferenceBackend {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<Transcript> {
        self.begin("transcribe", &format!("{mime_type}:{}", audio.len()))
            .await?;
        Ok(Transcript {
            text: self.config.transcript.clone(),
            language: Some("en".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_prompt_routing() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("default")
            .with_system_response("sys-a", "reply-a");

        assert_eq!(
            backend.generate_with_system("sys-a", "x").await.unwrap(),
            "reply-a"
        );
        assert_eq!(
            backend.generate_with_system("other", "x").await.unwrap(),
            "default"
        );
        assert_eq!(backend.generate_call_count(), 2);
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_fails() {
        let backend = MockInferenceBackend::new().with_failure_rate(1.0);
        assert!(backend.transcribe(b"a", "audio/wav").await.is_err());
        assert!(backend.describe_image(b"a", "image/png", "describe").await.is_err());
        assert_eq!(backend.call_count("transcribe"), 1);
    }

    #[tokio::test]
    async fn test_clones_share_call_log() {
        let backend = MockInferenceBackend::new().with_transcript("hello");
        let clone = backend.clone();
        let out = clone.transcribe(b"abc", "audio/ogg").await.unwrap();
        assert_eq!(out.text, "hello");
        assert_eq!(backend.get_calls()[0].input, "audio/ogg:3");
    }
}

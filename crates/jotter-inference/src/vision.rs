//! Image understanding for image notes.
//!
//! The model is asked for a short description followed by a `TEXT:` line
//! carrying anything legible in the picture (scale readouts, whiteboards,
//! receipts). [`ImageDescription::parse`] splits the reply back apart.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use jotter_core::{Error, Result};

/// Prompt asking for a description followed by any legible text.
pub const IMAGE_PROMPT: &str = "Describe this image in a few sentences, focusing on anything \
a person might want to remember or measure later. Then write a final line that starts with \
'TEXT:' followed by all text visible in the image, or 'TEXT: none' if there is none.";

const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Free-form model reply to `prompt` about the image.
    async fn describe_image(&self, image: &[u8], mime_type: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Parsed answer to [`IMAGE_PROMPT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub description: String,
    pub visible_text: Option<String>,
}

impl ImageDescription {
    /// Split a model reply at its `TEXT:` line.
    ///
    /// Replies without the marker are all description.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().replace("\r\n", "\n");
        let raw = normalized.as_str();
        let marker = raw
            .lines()
            .scan(0usize, |offset, line| {
                let start = *offset;
                *offset += line.len() + 1;
                Some((start, line))
            })
            .find(|(_, line)| line.trim_start().to_ascii_uppercase().starts_with("TEXT:"));

        let Some((start, line)) = marker else {
            return Self {
                description: raw.to_string(),
                visible_text: None,
            };
        };

        let label_end = start + (line.len() - line.trim_start().len()) + "TEXT:".len();
        let text = raw[label_end..].trim();
        let visible_text = match text.to_ascii_lowercase().as_str() {
            "" | "none" | "none." | "n/a" => None,
            _ => Some(text.to_string()),
        };
        Self {
            description: raw[..start].trim().to_string(),
            visible_text,
        }
    }
}

/// Describe an image with [`IMAGE_PROMPT`] and parse the reply.
pub async fn describe_note_image(
    backend: &dyn VisionBackend,
    image_data: &[u8],
    mime_type: &str,
) -> Result<ImageDescription> {
    let raw = backend
        .describe_image(image_data, mime_type, IMAGE_PROMPT)
        .await?;
    let parsed = ImageDescription::parse(&raw);
    if parsed.description.is_empty() {
        return Err(Error::Inference("vision model returned no description".into()));
    }
    Ok(parsed)
}

/// Multimodal model served by Ollama (llava, qwen2.5-vl, ...).
pub struct OllamaVisionBackend {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaVisionBackend {
    pub fn new(base_url: impl AsRef<str>, model: impl Into<String>) -> Self {
        Self {
            endpoint: format!("{}/api/generate", base_url.as_ref().trim_end_matches('/')),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `None` unless `OLLAMA_VISION_MODEL` is set; shares `OLLAMA_BASE` with
    /// the generation backend.
    pub fn from_env() -> Option<Self> {
        let model = std::env::var(jotter_core::defaults::ENV_OLLAMA_VISION_MODEL)
            .ok()
            .filter(|m| !m.trim().is_empty())?;
        let base_url = std::env::var("OLLAMA_BASE")
            .unwrap_or_else(|_| jotter_core::defaults::OLLAMA_URL.to_string());
        Some(Self::new(base_url, model))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [String; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: String,
}

#[async_trait]
impl VisionBackend for OllamaVisionBackend {
    #[instrument(skip(self, image, prompt), fields(subsystem = "inference", component = "vision", model = %self.model, size = image.len()))]
    async fn describe_image(&self, image: &[u8], _mime_type: &str, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            images: [base64::engine::general_purpose::STANDARD.encode(image)],
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .timeout(DESCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Vision request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("Vision model returned {status}: {body}")));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Unreadable vision reply: {e}")))?;

        debug!(
            response_len = reply.response.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Image description complete"
        );
        Ok(reply.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

//! Speech-to-text for audio notes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use jotter_core::{Error, Result};

/// Long recordings take a while on CPU-only servers.
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Text recovered from one audio object.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Trimmed transcript; may be empty for silent audio.
    pub text: String,
    /// ISO 639-1 code when the server reports one.
    pub language: Option<String>,
}

#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<Transcript>;

    fn model_name(&self) -> &str;
}

/// File extension the upload part is named with; servers sniff the container from it.
pub fn audio_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/aac" => "aac",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/webm" | "video/webm" => "webm",
        _ => "wav",
    }
}

/// Client for the OpenAI-style `/v1/audio/transcriptions` endpoint served by
/// faster-whisper-server, Speaches and similar.
pub struct WhisperBackend {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperBackend {
    pub fn new(base_url: impl AsRef<str>, model: impl Into<String>) -> Self {
        Self {
            endpoint: format!(
                "{}/v1/audio/transcriptions",
                base_url.as_ref().trim_end_matches('/')
            ),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `None` unless `WHISPER_BASE_URL` is set; audio notes are then stored
    /// without transcripts.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(jotter_core::defaults::ENV_WHISPER_BASE_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())?;
        let model = std::env::var(jotter_core::defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| jotter_core::defaults::DEFAULT_WHISPER_MODEL.to_string());
        Some(Self::new(base_url, model))
    }
}

#[derive(Deserialize)]
struct TranscriptionReply {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    #[instrument(skip(self, audio), fields(subsystem = "inference", component = "whisper", model = %self.model, size = audio.len()))]
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<Transcript> {
        let started = Instant::now();

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("note.{}", audio_extension(mime_type)))
            .mime_str(mime_type)
            .map_err(|e| Error::InvalidInput(format!("Bad audio MIME type {mime_type}: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .timeout(TRANSCRIBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Transcription request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Transcription server returned {status}: {body}"
            )));
        }

        let reply: TranscriptionReply = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Unreadable transcription reply: {e}")))?;

        debug!(
            response_len = reply.text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Transcription complete"
        );
        Ok(Transcript {
            text: reply.text.trim().to_string(),
            language: reply.language,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let backend = WhisperBackend::new("http://localhost:8000/", "whisper-1");
        assert_eq!(backend.endpoint, "http://localhost:8000/v1/audio/transcriptions");
        assert_eq!(backend.model_name(), "whisper-1");
    }

    #[test]
    fn test_audio_extension() {
        for (mime_type, expected) in [
            ("audio/mpeg", "mp3"),
            ("audio/x-wav", "wav"),
            ("audio/ogg", "ogg"),
            ("audio/x-flac", "flac"),
            ("audio/mp4", "m4a"),
            ("video/webm", "webm"),
            ("audio/unknown", "wav"),
        ] {
            assert_eq!(audio_extension(mime_type), expected, "{mime_type}");
        }
    }

    #[tokio::test]
    async fn test_transcript_is_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": " Slept seven hours. Heart rate 58. ",
                "language": "en"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = WhisperBackend::new(server.uri(), "whisper-1");
        let transcript = backend.transcribe(b"RIFF....", "audio/wav").await.unwrap();
        assert_eq!(transcript.text, "Slept seven hours. Heart rate 58.");
        assert_eq!(transcript.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_reply_without_language() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "walked the dog"
            })))
            .mount(&server)
            .await;

        let backend = WhisperBackend::new(server.uri(), "whisper-1");
        let transcript = backend.transcribe(b"ID3", "audio/mpeg").await.unwrap();
        assert_eq!(transcript.text, "walked the dog");
        assert!(transcript.language.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("decoder crashed"))
            .mount(&server)
            .await;

        let backend = WhisperBackend::new(server.uri(), "whisper-1");
        match backend.transcribe(b"x", "audio/mpeg").await.unwrap_err() {
            Error::Inference(msg) => assert!(msg.contains("decoder crashed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

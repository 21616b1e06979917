//! Transcription capability
//!
//! Voice messages arrive as audio URLs. The pipeline only needs three
//! operations from a transcription backend: classify a URL, validate it,
//! and produce a transcript. The HTTP client here delegates the actual
//! speech recognition to a configured service; transcription failures are
//! absorbed upstream by the audio gate and never block a message.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::TranscribeConfig;
use crate::{GatewayError, Result};

/// Audio file extensions the gateway recognizes
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".aac", ".ogg", ".flac", ".wma"];

/// Capability contract for audio transcription
#[async_trait]
pub trait TranscribeService: Send + Sync {
    /// Produce a transcript for the audio at `audio_url`
    async fn transcribe_audio(&self, audio_url: &str) -> Result<String>;

    /// Whether the URL points at a supported audio file
    fn is_audio_url(&self, url: &str) -> bool;

    /// Validate scheme, extension, and (if configured) host allow-list
    fn validate_audio_url(&self, url: &str) -> Result<()>;
}

/// HTTP-backed transcription client.
///
/// Posts the audio URL to the configured endpoint and expects a JSON body
/// with a `transcript` field. The endpoint owns download, duration limits,
/// and speech recognition.
pub struct HttpTranscribeClient {
    client: Client,
    config: TranscribeConfig,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    transcript: String,
}

impl HttpTranscribeClient {
    pub fn new(config: TranscribeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self { client, config })
    }

    fn has_audio_extension(url: &str) -> bool {
        let lower = url.to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }
}

#[async_trait]
impl TranscribeService for HttpTranscribeClient {
    async fn transcribe_audio(&self, audio_url: &str) -> Result<String> {
        self.validate_audio_url(audio_url)?;

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&json!({ "audio_url": audio_url }));
        if !self.config.api_token.is_empty() {
            request = request.bearer_auth(&self.config.api_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Transcription(format!(
                "transcription endpoint returned {status}"
            )));
        }

        let body: TranscriptResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transcription(e.to_string()))?;

        debug!(
            audio_url,
            transcript_length = body.transcript.len(),
            "audio transcribed"
        );

        Ok(body.transcript)
    }

    fn is_audio_url(&self, url: &str) -> bool {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return false;
        }
        if !Self::has_audio_extension(url) {
            return false;
        }
        if !self.config.allowed_domains.is_empty() {
            return self
                .config
                .allowed_domains
                .iter()
                .any(|domain| url.contains(domain.as_str()));
        }
        true
    }

    fn validate_audio_url(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(GatewayError::Transcription(
                "audio URL cannot be empty".to_string(),
            ));
        }

        let parsed = Url::parse(url)
            .map_err(|e| GatewayError::Transcription(format!("invalid audio URL: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(GatewayError::Transcription(
                "audio URL must start with http:// or https://".to_string(),
            ));
        }

        if !Self::has_audio_extension(url) {
            return Err(GatewayError::Transcription(
                "unsupported audio format".to_string(),
            ));
        }

        if !self.config.allowed_domains.is_empty() {
            let host = parsed.host_str().unwrap_or_default();
            let allowed = self
                .config
                .allowed_domains
                .iter()
                .any(|domain| host.contains(domain.as_str()));
            if !allowed {
                return Err(GatewayError::Transcription(format!(
                    "audio host '{host}' is not in the allow-list"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(config: TranscribeConfig) -> HttpTranscribeClient {
        HttpTranscribeClient::new(config).unwrap()
    }

    #[test]
    fn audio_urls_are_recognized_case_insensitively() {
        let client = client_with(TranscribeConfig::default());
        assert!(client.is_audio_url("https://cdn.example.com/voice.MP3"));
        assert!(client.is_audio_url("http://x/voice.ogg"));
        assert!(!client.is_audio_url("https://cdn.example.com/photo.jpg"));
        assert!(!client.is_audio_url("voice.mp3")); // not a URL
    }

    #[test]
    fn validation_rejects_bad_scheme_and_format() {
        let client = client_with(TranscribeConfig::default());
        assert!(client.validate_audio_url("ftp://x/voice.mp3").is_err());
        assert!(client.validate_audio_url("https://x/file.pdf").is_err());
        assert!(client.validate_audio_url("").is_err());
        assert!(client.validate_audio_url("https://x/voice.mp3").is_ok());
    }

    #[test]
    fn allow_list_restricts_hosts() {
        let client = client_with(TranscribeConfig {
            allowed_domains: vec!["cdn.example.com".to_string()],
            ..TranscribeConfig::default()
        });
        assert!(client
            .validate_audio_url("https://cdn.example.com/a.mp3")
            .is_ok());
        assert!(client.validate_audio_url("https://evil.com/a.mp3").is_err());
        assert!(!client.is_audio_url("https://evil.com/a.mp3"));
    }
}

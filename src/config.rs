//! Gateway configuration
//!
//! Configuration is layered: struct defaults first, then `GATEWAY_*`
//! environment variables (double underscore as the section separator, e.g.
//! `GATEWAY_NATS__URL`, `GATEWAY_STORE__TASK_RESULT_TTL_SECS`). The worker
//! binary loads a `.env` file before building the configuration, so local
//! development needs no exported environment.

use serde::Deserialize;
use std::time::Duration;

use crate::{GatewayError, Result};

/// The single provider value this worker accepts on inbound messages.
pub const SUPPORTED_PROVIDER: &str = "google_agent_engine";

/// Top-level configuration for the gateway worker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub nats: NatsConfig,
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub transcribe: TranscribeConfig,
    pub pipeline: PipelineConfig,
}

/// Queue transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// JetStream stream holding inbound user messages
    pub stream: String,
    /// Subject the producer publishes user messages on
    pub subject: String,
    /// Durable consumer name for this worker fleet
    pub consumer: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream: "GATEWAY_MESSAGES".to_string(),
            subject: "gateway.messages.user".to_string(),
            consumer: "gateway-worker".to_string(),
        }
    }
}

/// Task store configuration (JetStream key-value buckets)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix for bucket names, so several deployments can share a cluster
    pub bucket_prefix: String,
    /// TTL for task status and error keys (seconds)
    pub task_status_ttl_secs: u64,
    /// TTL for task result keys (seconds)
    pub task_result_ttl_secs: u64,
    /// TTL for generic string-cache keys (seconds)
    pub cache_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket_prefix: "gateway".to_string(),
            // Status outlives the result so clients can observe terminal
            // states after the payload itself expires.
            task_status_ttl_secs: 600,
            task_result_ttl_secs: 120,
            cache_ttl_secs: 720,
        }
    }
}

impl StoreConfig {
    pub fn task_status_ttl(&self) -> Duration {
        Duration::from_secs(self.task_status_ttl_secs)
    }

    pub fn task_result_ttl(&self) -> Duration {
        Duration::from_secs(self.task_result_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Agent engine endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the reasoning engine API
    pub base_url: String,
    /// Numeric project identifier the engine is deployed under
    pub project_number: String,
    /// Engine deployment location
    pub location: String,
    /// Reasoning engine identifier
    pub reasoning_engine_id: String,
    /// Bearer token for the engine API
    pub api_token: String,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://us-central1-aiplatform.googleapis.com".to_string(),
            project_number: String::new(),
            location: "us-central1".to_string(),
            reasoning_engine_id: String::new(),
            api_token: String::new(),
            timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    /// An engine client can only be constructed when the deployment
    /// coordinates are present.
    pub fn is_configured(&self) -> bool {
        !self.project_number.is_empty() && !self.reasoning_engine_id.is_empty()
    }

    /// Fully-qualified `:query` endpoint for the configured engine
    pub fn query_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/reasoningEngines/{}:query",
            self.base_url.trim_end_matches('/'),
            self.project_number,
            self.location,
            self.reasoning_engine_id
        )
    }
}

/// Transcription backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Transcription HTTP endpoint; empty disables the capability
    pub endpoint: String,
    /// Bearer token for the transcription endpoint
    pub api_token: String,
    /// Optional allow-list of audio host domains (empty allows any)
    pub allowed_domains: Vec<String>,
    /// Request timeout (seconds); audio downloads can be slow
    pub timeout_secs: u64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_token: String::new(),
            allowed_domains: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl TranscribeConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }
}

/// Pipeline behavior knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Text substituted when transcription cannot produce a usable result.
    /// The word is routed by the engine to its help flow, so it must stay
    /// aligned with the deployed agent's locale.
    pub fallback_text: String,
    /// Upper bound for resolved message text, enforced by content validation
    pub max_message_length: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fallback_text: "Ajuda".to_string(),
            max_message_length: 4096,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            transcribe: TranscribeConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the environment, layered over defaults
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("transcribe.allowed_domains")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}

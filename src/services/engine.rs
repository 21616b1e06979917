//! Engine client adapter
//!
//! The pipeline consumes the conversational engine through exactly two
//! operations: resolve a thread for a user and send one message on that
//! thread. Everything else about the engine (session state, tool use,
//! retries) stays behind its API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::AgentResponse;
use crate::services::store::TaskStore;
use crate::{GatewayError, Result};

/// Capability contract for the conversational engine
#[async_trait]
pub trait AgentEngineClient: Send + Sync {
    /// Resolve or create the conversation thread for a user key.
    /// The mapping is stable: one thread per user key.
    async fn get_or_create_thread(&self, user_key: &str) -> Result<String>;

    /// Send one message on a thread and return the engine's raw reply
    async fn send_message(&self, thread_id: &str, text: &str) -> Result<AgentResponse>;
}

/// Client for the Google Agent Engine (Vertex reasoning engine) API.
///
/// Thread resolution for this provider is deterministic: the thread id is
/// the user key itself, and the engine keeps per-thread context keyed by
/// it. A string cache keeps the mapping observable and stable should the
/// derivation ever change.
pub struct GoogleAgentEngineClient {
    client: Client,
    config: EngineConfig,
    cache: Option<Arc<dyn TaskStore>>,
}

impl GoogleAgentEngineClient {
    /// Create a new client with the given engine configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            config,
            cache: None,
        })
    }

    /// Attach a store whose string cache backs thread-id lookups
    pub fn with_cache(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.cache = Some(store);
        self
    }

    fn thread_cache_key(user_key: &str) -> String {
        format!("google_thread_id:{user_key}")
    }
}

#[async_trait]
impl AgentEngineClient for GoogleAgentEngineClient {
    async fn get_or_create_thread(&self, user_key: &str) -> Result<String> {
        let cache_key = Self::thread_cache_key(user_key);

        // Cache errors degrade to derivation, they never fail the lookup
        if let Some(store) = &self.cache {
            match store.get_cached_string(&cache_key).await {
                Ok(Some(thread_id)) => {
                    debug!(user_key, thread_id, "thread id cache hit");
                    return Ok(thread_id);
                }
                Ok(None) => {}
                Err(e) => warn!(user_key, error = %e, "thread id cache read failed"),
            }
        }

        let thread_id = user_key.to_string();

        if let Some(store) = &self.cache {
            if let Err(e) = store.set_cached_string(&cache_key, &thread_id).await {
                warn!(user_key, error = %e, "failed to cache thread id");
            }
        }

        Ok(thread_id)
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<AgentResponse> {
        let body = json!({
            "input": {
                "messages": [{"role": "human", "content": text}],
            },
            "config": {
                "configurable": {"thread_id": thread_id},
            },
        });

        let mut request = self.client.post(self.config.query_url()).json(&body);
        if !self.config.api_token.is_empty() {
            request = request.bearer_auth(&self.config.api_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Engine(e.to_string()))?;

        let status = response.status();
        let content = response
            .text()
            .await
            .map_err(|e| GatewayError::Engine(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::Engine(format!(
                "engine returned {status}: {content}"
            )));
        }

        debug!(
            thread_id,
            raw_response_length = content.len(),
            "received engine reply"
        );

        Ok(AgentResponse {
            content,
            message_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
        })
    }
}

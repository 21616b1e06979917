//! Task store abstraction and backends
//!
//! The pipeline records three kinds of task state per message id: a
//! lifecycle status, the serialized result artifact, and (on failure) the
//! raw error text. A small string cache rides along for thread-id lookups.
//! All writes are best-effort from the pipeline's point of view: callers
//! log store errors and move on, they never fail a message over them.
//!
//! ## NATS Backend
//!
//! [`NatsTaskStore`] keeps the state in three JetStream key-value buckets:
//!
//! - `{prefix}-task-status` — status and error keys, status TTL
//! - `{prefix}-task-results` — result artifacts, result TTL
//! - `{prefix}-cache` — string cache, cache TTL
//!
//! TTLs are enforced per bucket via `max_age`, which is why status/error
//! and results live in separate buckets. Key characters outside the NATS
//! key alphabet are sanitized to `_`.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use async_nats::jetstream::{self, kv};

use crate::config::StoreConfig;
use crate::models::TaskStatus;
use crate::{GatewayError, Result};

/// Task state writes and the string cache, as the pipeline consumes them
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Write the lifecycle status for a message id
    async fn set_task_status(&self, message_id: &str, status: TaskStatus) -> Result<()>;

    /// Write the serialized result artifact for a message id
    async fn set_task_result(&self, message_id: &str, result: &str) -> Result<()>;

    /// Write the raw error text for a failed message id
    async fn set_task_error(&self, message_id: &str, error: &str) -> Result<()>;

    /// Read a cached string value
    async fn get_cached_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a cached string value
    async fn set_cached_string(&self, key: &str, value: &str) -> Result<()>;
}

/// Map arbitrary ids onto the NATS key alphabet
fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn status_key(message_id: &str) -> String {
    format!("status.{}", sanitize_key(message_id))
}

fn error_key(message_id: &str) -> String {
    format!("error.{}", sanitize_key(message_id))
}

fn result_key(message_id: &str) -> String {
    format!("message.{}", sanitize_key(message_id))
}

fn cache_key(key: &str) -> String {
    format!("cache.{}", sanitize_key(key))
}

/// JetStream key-value implementation of [`TaskStore`]
pub struct NatsTaskStore {
    status: kv::Store,
    results: kv::Store,
    cache: kv::Store,
}

impl NatsTaskStore {
    /// Create (or open) the three buckets this store needs
    pub async fn connect(js: &jetstream::Context, config: &StoreConfig) -> Result<Self> {
        let status = Self::bucket(
            js,
            format!("{}-task-status", config.bucket_prefix),
            config.task_status_ttl(),
        )
        .await?;
        let results = Self::bucket(
            js,
            format!("{}-task-results", config.bucket_prefix),
            config.task_result_ttl(),
        )
        .await?;
        let cache = Self::bucket(
            js,
            format!("{}-cache", config.bucket_prefix),
            config.cache_ttl(),
        )
        .await?;

        Ok(Self {
            status,
            results,
            cache,
        })
    }

    async fn bucket(js: &jetstream::Context, name: String, ttl: Duration) -> Result<kv::Store> {
        // create_key_value is not idempotent across config changes, so fall
        // back to opening an existing bucket as-is
        match js
            .create_key_value(kv::Config {
                bucket: name.clone(),
                history: 1,
                max_age: ttl,
                ..Default::default()
            })
            .await
        {
            Ok(store) => Ok(store),
            Err(create_err) => js.get_key_value(&name).await.map_err(|open_err| {
                GatewayError::Storage(anyhow::anyhow!(
                    "failed to create bucket {name}: {create_err}; open also failed: {open_err}"
                ))
            }),
        }
    }

    async fn put(store: &kv::Store, key: String, value: &str) -> Result<()> {
        store
            .put(key.as_str(), Bytes::from(value.to_owned()))
            .await
            .map_err(|e| GatewayError::Storage(anyhow::anyhow!("kv put {key}: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for NatsTaskStore {
    async fn set_task_status(&self, message_id: &str, status: TaskStatus) -> Result<()> {
        debug!(message_id, status = %status, "writing task status");
        Self::put(&self.status, status_key(message_id), status.as_str()).await
    }

    async fn set_task_result(&self, message_id: &str, result: &str) -> Result<()> {
        debug!(message_id, result_length = result.len(), "writing task result");
        Self::put(&self.results, result_key(message_id), result).await
    }

    async fn set_task_error(&self, message_id: &str, error: &str) -> Result<()> {
        debug!(message_id, "writing task error");
        Self::put(&self.status, error_key(message_id), error).await
    }

    async fn get_cached_string(&self, key: &str) -> Result<Option<String>> {
        let entry = self
            .cache
            .get(cache_key(key))
            .await
            .map_err(|e| GatewayError::Storage(anyhow::anyhow!("kv get {key}: {e}")))?;
        Ok(entry.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn set_cached_string(&self, key: &str, value: &str) -> Result<()> {
        Self::put(&self.cache, cache_key(key), value).await
    }
}

/// In-memory implementation of [`TaskStore`] for development and testing.
///
/// Status writes are kept as a history per message id so tests can assert
/// ordering (`processing` before the terminal status). `fail_writes` makes
/// every write error, exercising the pipeline's best-effort policy.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    statuses: DashMap<String, Vec<TaskStatus>>,
    results: DashMap<String, String>,
    errors: DashMap<String, String>,
    cache: DashMap<String, String>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make all subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn status_history(&self, message_id: &str) -> Vec<TaskStatus> {
        self.statuses
            .get(message_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn last_status(&self, message_id: &str) -> Option<TaskStatus> {
        self.status_history(message_id).last().copied()
    }

    pub fn result(&self, message_id: &str) -> Option<String> {
        self.results.get(message_id).map(|entry| entry.clone())
    }

    pub fn error(&self, message_id: &str) -> Option<String> {
        self.errors.get(message_id).map(|entry| entry.clone())
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(GatewayError::Storage(anyhow::anyhow!(
                "simulated store failure"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn set_task_status(&self, message_id: &str, status: TaskStatus) -> Result<()> {
        self.check_failure()?;
        self.statuses
            .entry(message_id.to_string())
            .or_default()
            .push(status);
        Ok(())
    }

    async fn set_task_result(&self, message_id: &str, result: &str) -> Result<()> {
        self.check_failure()?;
        self.results
            .insert(message_id.to_string(), result.to_string());
        Ok(())
    }

    async fn set_task_error(&self, message_id: &str, error: &str) -> Result<()> {
        self.check_failure()?;
        self.errors
            .insert(message_id.to_string(), error.to_string());
        Ok(())
    }

    async fn get_cached_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).map(|entry| entry.clone()))
    }

    async fn set_cached_string(&self, key: &str, value: &str) -> Result<()> {
        self.check_failure()?;
        self.cache.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

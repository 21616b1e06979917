// Agent Gateway - message processing worker
// Consumes end-user messages from NATS, resolves them through a
// conversational agent engine, and stores the normalized result.

//! # Agent Gateway Library
//!
//! This is the main library crate for the Agent Gateway worker. The gateway
//! sits between a message queue and a conversational-AI engine: every queue
//! delivery is turned into a normalized, client-facing reply and written to
//! a retrievable result store.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`QueueMessage`]: The inbound unit of work read from the queue
//! - [`ProcessedMessageData`]: The final artifact persisted per message
//! - [`TransformedMessage`] / [`UsageStatistics`]: The client message schema
//! - [`TaskStatus`]: Per-message lifecycle marker (processing/completed/failed)
//!
//! ### Pipeline
//! The per-message pipeline lives in [`worker`]:
//!
//! - **Audio Gate**: audio references are transcribed, with a safe fallback
//! - **Response Transformer**: engine replies become client schema messages
//! - **Content Formatter Gate**: channel formatting with pass-through on failure
//! - **[`MessageProcessor`]**: orchestrates the above and manages task state
//!
//! ### Capability Adapters
//! External collaborators are consumed through narrow trait contracts in
//! [`services`]: [`AgentEngineClient`], [`TranscribeService`],
//! [`MessageFormatter`], and [`TaskStore`]. Each has a production
//! implementation (reqwest / NATS JetStream) and an in-memory double for
//! tests, so the pipeline never depends on a concrete backend.
//!
//! ## Error Contract
//!
//! Only transport-level failures (a payload that cannot be deserialized)
//! surface as errors from the worker's entry point. Application-level
//! failures are recorded in the store and reported as success to the queue
//! so that deliveries are never retried for errors a retry cannot fix.

pub mod config;

// Core domain models (wire formats and client schema)
pub mod models;

// Capability adapters: engine client, transcription, formatting, task store
pub mod services;

// The message processing pipeline and queue consumer loop
pub mod worker;

// Re-export core domain types for easy access
pub use models::{
    AgentResponse,        // Raw reply from the agent engine
    OutboundMessage,      // One entry of the persisted message sequence
    ProcessedMessageData, // Final persisted artifact
    QueueMessage,         // Inbound unit of work
    TaskStatus,           // Lifecycle marker for a queue message
    TransformedMessage,   // Normalized client-facing message
    UsageStatistics,      // Synthetic trailing usage record
};

// Re-export the capability traits and their production implementations
pub use services::{
    engine::{AgentEngineClient, GoogleAgentEngineClient},
    formatter::{MessageFormatter, WhatsAppFormatter},
    store::{InMemoryStore, NatsTaskStore, TaskStore},
    transcribe::{HttpTranscribeClient, TranscribeService},
};

// Re-export the pipeline entry points
pub use worker::{
    processor::MessageProcessor,
    step_id::{RandomStepIds, StepIdGenerator},
    Worker,
};

pub use config::GatewayConfig;

// Core error types
use thiserror::Error;

/// Error taxonomy for gateway operations.
///
/// The variants map onto the failure policy of the pipeline:
/// - [`GatewayError::Serialization`] on an inbound payload is the only
///   error the queue consumer propagates (the transport applies its own
///   redelivery policy)
/// - configuration errors ([`GatewayError::UnsupportedProvider`],
///   [`GatewayError::EngineUnavailable`]) and upstream errors
///   ([`GatewayError::Engine`], [`GatewayError::ResponseParse`],
///   [`GatewayError::ResponseFormat`]) terminate a message and are recorded
///   in the store, never retried
/// - transcription and formatting failures are absorbed inside the pipeline
///   with fallbacks and normally never reach this type
/// - store write failures are logged at the call site and never escalated
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The inbound message named a provider this worker does not serve
    #[error("unsupported provider: {0} (currently only 'google_agent_engine' is supported)")]
    UnsupportedProvider(String),

    /// The engine client capability was not configured
    #[error("agent engine client is required but not available")]
    EngineUnavailable,

    /// The resolved message text failed content validation
    #[error("invalid message content: {0}")]
    InvalidContent(String),

    /// Thread resolution against the engine failed
    #[error("failed to get thread: {0}")]
    Thread(String),

    /// The engine call itself failed
    #[error("failed to get AI response: {0}")]
    Engine(String),

    /// The engine payload was not valid JSON
    #[error("failed to parse AI response JSON: {0}")]
    ResponseParse(String),

    /// The engine payload parsed but did not match the expected shape
    #[error("invalid agent engine response format - {0}")]
    ResponseFormat(String),

    /// Audio transcription failed (absorbed by the audio gate)
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Configuration could not be loaded or was inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// Queue transport errors from the consumer loop
    #[error("queue error: {0}")]
    Queue(String),

    /// Storage-related errors
    /// Using anyhow::Error for flexible error handling across store backends
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// JSON serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal errors that fit no other category
    #[error("internal error: {0}")]
    Internal(String),
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, GatewayError>;

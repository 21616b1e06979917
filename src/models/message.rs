//! Queue-side wire formats and the persisted artifact
//!
//! [`QueueMessage`] is what the producer publishes; it is read-only inside
//! the pipeline. [`ProcessedMessageData`] is the one artifact the pipeline
//! writes per message, and [`TaskStatus`] is the lifecycle marker clients
//! poll while the artifact is being produced.

use serde::{Deserialize, Serialize};

use super::transformed::OutboundMessage;

/// An inbound unit of work delivered from the queue.
///
/// `provider` selects the conversational engine; exactly one value is
/// accepted today and anything else is rejected before the engine is
/// touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Producer-assigned message identifier; also keys the task status and
    /// result entries in the store
    pub id: String,
    /// End-user identity; threads are keyed 1:1 by this value
    pub user_number: String,
    /// Raw message text, or an audio URL for voice messages
    pub message: String,
    /// Optional previous message carried for context
    #[serde(default)]
    pub previous_message: Option<String>,
    /// Engine provider selector
    pub provider: String,
    /// Producer-side message kind tag (informational)
    #[serde(rename = "type")]
    pub message_type: String,
}

/// Raw reply from the conversational engine.
///
/// `content` is opaque JSON text with a top-level `output.messages` field;
/// it is parsed once by [`super::engine::EngineReply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub message_id: String,
    pub thread_id: String,
}

/// Lifecycle marker for a queue message.
///
/// `Processing` is written at pipeline entry, then exactly one terminal
/// status follows. Status writes are best-effort and never fail the
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final persisted artifact for one processed queue message.
///
/// `messages` is the ordered transformed sequence with the synthetic
/// usage-statistics record appended last. `processed_at` carries the
/// original message id so clients can correlate the artifact with their
/// request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessageData {
    pub messages: Vec<OutboundMessage>,
    pub agent_id: String,
    pub processed_at: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_message_parses_with_optional_previous_message() {
        let raw = r#"{
            "id": "msg-1",
            "user_number": "5521999999999",
            "message": "hello",
            "provider": "google_agent_engine",
            "type": "user"
        }"#;
        let msg: QueueMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.id, "msg-1");
        assert_eq!(msg.previous_message, None);
        assert_eq!(msg.message_type, "user");
    }

    #[test]
    fn task_status_serializes_lowercase() {
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert_eq!(
            serde_json::to_string(&TaskStatus::Failed).unwrap(),
            "\"failed\""
        );
    }
}

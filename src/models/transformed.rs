//! Client-facing message schema
//!
//! The transformer projects every raw engine message onto
//! [`TransformedMessage`], a fixed field set the downstream API expects.
//! Several fields (`date`, `session_id`, `time_since_last_message`,
//! `sender_id`, `is_err`) are placeholders the engine does not provide and
//! are always serialized as `null`. Type-specific extras (`tool_call`,
//! tool-return fields) are only present on the matching message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client message type, derived from the engine's role tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserMessage,
    AssistantMessage,
    ToolCallMessage,
    ToolReturnMessage,
}

/// Tool invocation details attached to `tool_call_message` entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: Option<Value>,
    pub arguments: Option<Value>,
    pub tool_call_id: Option<Value>,
}

/// Tool result details attached to `tool_return_message` entries.
///
/// `stdout`/`stderr` are part of the client schema but the engine never
/// reports them, so they are emitted as explicit nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReturnInfo {
    pub tool_return: Option<Value>,
    pub status: String,
    pub tool_call_id: Option<Value>,
    pub stdout: Option<Value>,
    pub stderr: Option<Value>,
}

/// One normalized message unit in the client schema.
///
/// Created by the transformer, mutated exactly once by the content
/// formatter gate, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedMessage {
    pub id: Option<Value>,
    pub date: Option<Value>,
    pub session_id: Option<Value>,
    pub time_since_last_message: Option<Value>,
    pub name: Option<Value>,
    /// Mirrors `id`; kept as a separate field for schema compatibility
    pub otid: Option<Value>,
    pub sender_id: Option<Value>,
    pub step_id: String,
    pub is_err: Option<Value>,
    pub model_name: Option<Value>,
    pub finish_reason: Option<Value>,
    pub avg_logprobs: Option<Value>,
    pub usage_metadata: Option<UsageMetadata>,
    pub message_type: MessageType,
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallInfo>,
    // Flattened Option: serializes nothing when None, so plain messages
    // carry no tool-return keys at all
    #[serde(flatten)]
    pub tool_return: Option<ToolReturnInfo>,
}

/// Token accounting in the client schema.
///
/// All counters are floating-point regardless of how the engine reported
/// them; the two detail counters are only present when the engine supplied
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: Option<f64>,
    pub candidates_token_count: Option<f64>,
    pub total_token_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<f64>,
}

/// Synthetic trailing record summarizing the exchange.
///
/// Exactly one is appended per processed message. Token counters are
/// zeroed (per-message accounting lives on the individual messages);
/// `agent_id` is blank until the orchestrator stamps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStatistics {
    pub message_type: String,
    pub completion_tokens: u64,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
    pub step_count: usize,
    pub steps_messages: Option<Value>,
    pub run_ids: Option<Value>,
    pub agent_id: String,
    pub processed_at: String,
    pub status: String,
    pub model_names: Vec<String>,
}

impl UsageStatistics {
    pub const MESSAGE_TYPE: &'static str = "usage_statistics";

    /// Build the trailing record for an exchange of `step_count` messages
    pub fn for_steps(step_count: usize) -> Self {
        Self {
            message_type: Self::MESSAGE_TYPE.to_string(),
            completion_tokens: 0,
            prompt_tokens: 0,
            total_tokens: 0,
            step_count,
            steps_messages: None,
            run_ids: None,
            agent_id: String::new(),
            processed_at: chrono::Utc::now().to_rfc3339(),
            status: "done".to_string(),
            model_names: Vec::new(),
        }
    }
}

/// One entry of the persisted message sequence: either a normalized chat
/// message or the trailing usage-statistics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Chat(TransformedMessage),
    Usage(UsageStatistics),
}

impl OutboundMessage {
    pub fn as_chat(&self) -> Option<&TransformedMessage> {
        match self {
            OutboundMessage::Chat(msg) => Some(msg),
            OutboundMessage::Usage(_) => None,
        }
    }

    pub fn as_usage(&self) -> Option<&UsageStatistics> {
        match self {
            OutboundMessage::Usage(stats) => Some(stats),
            OutboundMessage::Chat(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_chat(message_type: MessageType) -> TransformedMessage {
        TransformedMessage {
            id: Some(json!("m1")),
            date: None,
            session_id: None,
            time_since_last_message: None,
            name: None,
            otid: Some(json!("m1")),
            sender_id: None,
            step_id: "step-deadbeef-dead-beef-dead-beefdeadbeef".to_string(),
            is_err: None,
            model_name: None,
            finish_reason: None,
            avg_logprobs: None,
            usage_metadata: None,
            message_type,
            content: Some(json!("hello")),
            tool_call: None,
            tool_return: None,
        }
    }

    #[test]
    fn placeholder_fields_serialize_as_null() {
        let msg = minimal_chat(MessageType::UserMessage);
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["date", "session_id", "time_since_last_message", "sender_id", "is_err"] {
            assert!(obj.contains_key(key), "missing placeholder field {key}");
            assert!(obj[key].is_null(), "{key} should be null");
        }
        // Type-specific extras are absent on plain messages
        assert!(!obj.contains_key("tool_call"));
        assert!(!obj.contains_key("tool_return"));
        assert!(!obj.contains_key("stdout"));
    }

    #[test]
    fn tool_return_fields_flatten_into_the_message() {
        let mut msg = minimal_chat(MessageType::ToolReturnMessage);
        msg.tool_return = Some(ToolReturnInfo {
            tool_return: Some(json!("result text")),
            status: "success".to_string(),
            tool_call_id: Some(json!("call-1")),
            stdout: None,
            stderr: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["tool_return"], json!("result text"));
        assert_eq!(obj["status"], json!("success"));
        assert!(obj["stdout"].is_null());
        assert!(obj["stderr"].is_null());
    }

    #[test]
    fn outbound_round_trip_distinguishes_usage_record() {
        let messages = vec![
            OutboundMessage::Chat(minimal_chat(MessageType::AssistantMessage)),
            OutboundMessage::Usage(UsageStatistics::for_steps(1)),
        ];
        let json = serde_json::to_string(&messages).unwrap();
        let parsed: Vec<OutboundMessage> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].as_chat().is_some());
        let usage = parsed[1].as_usage().unwrap();
        assert_eq!(usage.step_count, 1);
        assert_eq!(usage.message_type, UsageStatistics::MESSAGE_TYPE);
    }
}

//! Response transformer
//!
//! Projects raw engine messages onto the client schema. The mapping is
//! fixed: engine role tags choose the client message type, nested response
//! metadata is pulled up with renamed token counters, and type-specific
//! extras are attached for tool calls and tool returns. After all entries
//! are processed exactly one usage-statistics record is appended; the
//! orchestrator stamps its `agent_id` afterwards.

use serde_json::Value;

use crate::models::{
    MessageType, OutboundMessage, RawEngineMessage, RawUsageMetadata, ToolCallInfo,
    ToolReturnInfo, TransformedMessage, UsageMetadata, UsageStatistics,
};
use crate::worker::step_id::StepIdGenerator;

/// Transform a normalized engine message list into the client schema,
/// appending the trailing usage-statistics record.
pub fn transform_messages(
    raw: Vec<RawEngineMessage>,
    step_ids: &dyn StepIdGenerator,
) -> Vec<OutboundMessage> {
    let mut out: Vec<OutboundMessage> = raw
        .into_iter()
        .map(|msg| OutboundMessage::Chat(transform_one(msg, step_ids)))
        .collect();

    let step_count = out.len();
    out.push(OutboundMessage::Usage(UsageStatistics::for_steps(
        step_count,
    )));
    out
}

/// Map the engine's role tag to a client message type.
///
/// Unknown or absent roles fall back to `user_message`; an `ai` message
/// carrying tool calls is a `tool_call_message`.
pub fn map_message_type(msg: &RawEngineMessage) -> MessageType {
    match msg.role.as_deref() {
        Some("human") => MessageType::UserMessage,
        Some("ai") => {
            if msg.tool_calls.is_empty() {
                MessageType::AssistantMessage
            } else {
                MessageType::ToolCallMessage
            }
        }
        Some("tool") => MessageType::ToolReturnMessage,
        _ => MessageType::UserMessage,
    }
}

fn transform_one(msg: RawEngineMessage, step_ids: &dyn StepIdGenerator) -> TransformedMessage {
    let message_type = map_message_type(&msg);
    let meta = msg.response_metadata.as_ref();

    let mut transformed = TransformedMessage {
        id: msg.id.clone(),
        date: None,
        session_id: None,
        time_since_last_message: None,
        name: msg.name.clone(),
        otid: msg.id.clone(),
        sender_id: None,
        step_id: step_ids.step_id(),
        is_err: None,
        model_name: meta.and_then(|m| m.model_name.clone()),
        finish_reason: meta.and_then(|m| m.finish_reason.clone()),
        avg_logprobs: meta.and_then(|m| m.avg_logprobs.clone()),
        usage_metadata: meta
            .and_then(|m| m.usage_metadata.as_ref())
            .map(project_usage_metadata),
        message_type,
        content: msg.content.clone(),
        tool_call: None,
        tool_return: None,
    };

    match message_type {
        MessageType::ToolCallMessage => {
            if let Some(tool_call) = msg.tool_calls.first() {
                transformed.tool_call = Some(ToolCallInfo {
                    name: tool_call.name.clone(),
                    arguments: tool_call.args.clone(),
                    tool_call_id: tool_call.id.clone(),
                });
            }
        }
        MessageType::ToolReturnMessage => {
            transformed.tool_return = Some(ToolReturnInfo {
                tool_return: msg.content.clone(),
                status: "success".to_string(),
                tool_call_id: msg.tool_call_id.clone(),
                stdout: None,
                stderr: None,
            });
        }
        MessageType::UserMessage | MessageType::AssistantMessage => {}
    }

    transformed
}

/// Project raw token accounting onto the client schema.
///
/// Every counter is normalized to f64 regardless of how the engine
/// serialized it; non-numeric values are dropped.
fn project_usage_metadata(raw: &RawUsageMetadata) -> UsageMetadata {
    UsageMetadata {
        prompt_token_count: to_f64(&raw.input_tokens),
        candidates_token_count: to_f64(&raw.output_tokens),
        total_token_count: to_f64(&raw.total_tokens),
        thoughts_token_count: raw
            .output_token_details
            .as_ref()
            .and_then(|details| to_f64(&details.reasoning)),
        cached_content_token_count: raw
            .input_token_details
            .as_ref()
            .and_then(|details| to_f64(&details.cache_read)),
    }
}

fn to_f64(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(Value::as_f64)
}

//! Typed schema for the engine's raw reply
//!
//! The engine returns JSON text whose shape is only loosely guaranteed:
//! `output.messages` may be absent, a single object, or a sequence, and
//! every field on an individual message is optional. Instead of navigating
//! untyped maps throughout the transform step, the payload is validated
//! once here at the parse boundary and the rest of the pipeline works with
//! these structs.
//!
//! Parsing policy:
//! - a payload that is not JSON at all is a [`GatewayError::ResponseParse`]
//! - a missing or non-object `output` is a [`GatewayError::ResponseFormat`]
//! - entries under `output.messages` that are not objects are skipped with
//!   a warning; they never fail the whole reply
//! - a wrong-typed field inside an object entry (a `null` tool-call list,
//!   a numeric `type`) falls back to its default; the entry is kept

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{GatewayError, Result};

/// Top-level engine reply. Only `output` matters; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineReply {
    pub output: EngineOutput,
}

/// The `output` object of an engine reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineOutput {
    /// Absent, a single message object, or a sequence of them
    #[serde(default)]
    pub messages: Option<Value>,
}

/// Treat a wrong-typed field as absent instead of failing the entry.
///
/// Mirrors the per-field tolerance of the transform step: a message whose
/// `tool_calls` is `null` or whose `type` is a number still goes through,
/// the offending field just falls back to its default.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Like [`lenient`], but element-wise: non-object entries in a tool-call
/// list are skipped, anything that is not a list becomes empty.
fn lenient_tool_calls<'de, D>(deserializer: D) -> std::result::Result<Vec<RawToolCall>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// One raw message entry produced by the engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEngineMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    /// Engine role tag: `human`, `ai`, or `tool`
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default, deserialize_with = "lenient_tool_calls")]
    pub tool_calls: Vec<RawToolCall>,
    #[serde(default)]
    pub tool_call_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub response_metadata: Option<RawResponseMetadata>,
}

/// A tool invocation requested by the engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToolCall {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub args: Option<Value>,
}

/// Nested response metadata carried on assistant messages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResponseMetadata {
    #[serde(default)]
    pub model_name: Option<Value>,
    #[serde(default)]
    pub finish_reason: Option<Value>,
    #[serde(default)]
    pub avg_logprobs: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub usage_metadata: Option<RawUsageMetadata>,
}

/// Token accounting as the engine reports it, before renaming
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsageMetadata {
    #[serde(default)]
    pub input_tokens: Option<Value>,
    #[serde(default)]
    pub output_tokens: Option<Value>,
    #[serde(default)]
    pub total_tokens: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub output_token_details: Option<RawOutputTokenDetails>,
    #[serde(default, deserialize_with = "lenient")]
    pub input_token_details: Option<RawInputTokenDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOutputTokenDetails {
    #[serde(default)]
    pub reasoning: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInputTokenDetails {
    #[serde(default)]
    pub cache_read: Option<Value>,
}

impl EngineReply {
    /// Parse the raw engine payload after stripping formatting noise.
    ///
    /// Upstream serialization sometimes embeds literal newlines inside the
    /// JSON text, so `\n`/`\r` are removed and the payload trimmed before
    /// parsing.
    pub fn from_raw_content(content: &str) -> Result<Self> {
        let cleaned = content.replace(['\n', '\r'], "");
        let cleaned = cleaned.trim();

        let value: Value = serde_json::from_str(cleaned)
            .map_err(|e| GatewayError::ResponseParse(e.to_string()))?;

        let output = value
            .get("output")
            .ok_or_else(|| GatewayError::ResponseFormat("missing 'output' field".to_string()))?;
        if !output.is_object() {
            return Err(GatewayError::ResponseFormat(
                "'output' is not an object".to_string(),
            ));
        }

        let output: EngineOutput = serde_json::from_value(output.clone())
            .map_err(|e| GatewayError::ResponseFormat(e.to_string()))?;

        Ok(EngineReply { output })
    }
}

impl EngineOutput {
    /// Normalize `messages` to a sequence, skipping non-object entries.
    pub fn message_list(&self) -> Vec<RawEngineMessage> {
        let entries: Vec<Value> = match &self.messages {
            None => {
                warn!("no 'messages' field in engine output, using empty list");
                Vec::new()
            }
            Some(Value::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
        };

        entries
            .into_iter()
            .filter_map(|entry| {
                if !entry.is_object() {
                    warn!("skipping non-object entry in engine messages");
                    return None;
                }
                match serde_json::from_value::<RawEngineMessage>(entry) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        warn!(error = %e, "skipping malformed engine message entry");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_payload_with_embedded_newlines() {
        let raw = "{\n  \"output\": {\n    \"messages\": []\n  }\n}\n";
        let reply = EngineReply::from_raw_content(raw).unwrap();
        assert!(reply.output.message_list().is_empty());
    }

    #[test]
    fn missing_output_is_a_format_error() {
        let err = EngineReply::from_raw_content(r#"{"result": {}}"#).unwrap_err();
        assert!(matches!(err, GatewayError::ResponseFormat(_)));
    }

    #[test]
    fn non_object_output_is_a_format_error() {
        let err = EngineReply::from_raw_content(r#"{"output": [1, 2]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::ResponseFormat(_)));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = EngineReply::from_raw_content("not json at all").unwrap_err();
        assert!(matches!(err, GatewayError::ResponseParse(_)));
    }

    #[test]
    fn single_message_object_becomes_one_element_list() {
        let raw = r#"{"output": {"messages": {"type": "ai", "content": "hi"}}}"#;
        let reply = EngineReply::from_raw_content(raw).unwrap();
        let list = reply.output.message_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].role.as_deref(), Some("ai"));
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let raw = r#"{"output": {"messages": [{"type": "human", "content": "a"}, 42, "junk"]}}"#;
        let reply = EngineReply::from_raw_content(raw).unwrap();
        assert_eq!(reply.output.message_list().len(), 1);
    }

    #[test]
    fn null_tool_calls_does_not_drop_the_entry() {
        let raw = r#"{"output": {"messages": [
            {"type": "ai", "content": "hi", "tool_calls": null}
        ]}}"#;
        let reply = EngineReply::from_raw_content(raw).unwrap();
        let list = reply.output.message_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].role.as_deref(), Some("ai"));
        assert!(list[0].tool_calls.is_empty());
    }

    #[test]
    fn wrong_typed_fields_fall_back_to_defaults() {
        let raw = r#"{"output": {"messages": [
            {"type": 7, "content": "kept", "response_metadata": "oops"},
            {"type": "ai", "content": "hi", "tool_calls": [
                {"id": "c1", "name": "lookup", "args": {}},
                "not an object"
            ]},
            {"type": "ai", "content": "hi", "response_metadata": {"usage_metadata": []}}
        ]}}"#;
        let reply = EngineReply::from_raw_content(raw).unwrap();
        let list = reply.output.message_list();
        assert_eq!(list.len(), 3);

        assert!(list[0].role.is_none());
        assert!(list[0].response_metadata.is_none());
        assert_eq!(list[0].content, Some(serde_json::json!("kept")));

        assert_eq!(list[1].tool_calls.len(), 1);
        assert_eq!(list[1].tool_calls[0].name, Some(serde_json::json!("lookup")));

        assert!(list[2]
            .response_metadata
            .as_ref()
            .unwrap()
            .usage_metadata
            .is_none());
    }

    #[test]
    fn usage_metadata_nests_token_details() {
        let raw = r#"{"output": {"messages": [{
            "type": "ai",
            "content": "hi",
            "response_metadata": {
                "model_name": "gemini-2.0",
                "usage_metadata": {
                    "input_tokens": 10,
                    "output_tokens": 5,
                    "total_tokens": 15,
                    "output_token_details": {"reasoning": 3},
                    "input_token_details": {"cache_read": 2}
                }
            }
        }]}}"#;
        let reply = EngineReply::from_raw_content(raw).unwrap();
        let list = reply.output.message_list();
        let usage = list[0]
            .response_metadata
            .as_ref()
            .unwrap()
            .usage_metadata
            .as_ref()
            .unwrap();
        assert_eq!(usage.total_tokens, Some(serde_json::json!(15)));
        assert_eq!(
            usage.output_token_details.as_ref().unwrap().reasoning,
            Some(serde_json::json!(3))
        );
    }
}

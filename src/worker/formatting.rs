//! Content formatter gate
//!
//! Rewrites the textual content of chat messages through the channel
//! formatter after transformation and before persistence. The gate is
//! best-effort: without a formatter, or when a single message fails to
//! format, the original content is kept unchanged. Non-string content,
//! empty strings and the trailing usage-statistics record pass through
//! untouched.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::models::{AgentResponse, OutboundMessage};
use crate::services::formatter::MessageFormatter;

/// Apply the channel formatter to every chat message with non-empty
/// string content. Mutates in place; never fails the pipeline.
pub async fn apply_formatting(
    formatter: Option<&Arc<dyn MessageFormatter>>,
    messages: &mut [OutboundMessage],
) {
    let Some(formatter) = formatter else {
        return;
    };

    for entry in messages.iter_mut() {
        let OutboundMessage::Chat(msg) = entry else {
            continue;
        };
        let Some(Value::String(content)) = &msg.content else {
            continue;
        };
        if content.is_empty() {
            continue;
        }

        let response = AgentResponse {
            content: content.clone(),
            message_id: String::new(),
            thread_id: String::new(),
        };
        match formatter.format_for_whatsapp(&response).await {
            Ok(formatted) => msg.content = Some(Value::String(formatted)),
            Err(err) => {
                warn!(error = %err, "message formatting failed, keeping original content");
            }
        }
    }
}

//! Message formatting capability
//!
//! The engine writes markdown; the delivery channel (WhatsApp) speaks its
//! own dialect. [`WhatsAppFormatter`] converts between the two and also
//! provides content validation for inbound text. The formatter gate in the
//! pipeline treats every formatting failure as degradable: the original
//! content is kept, never dropped.

use async_trait::async_trait;

use crate::models::AgentResponse;
use crate::{GatewayError, Result};

/// Capability contract for channel-specific text formatting
#[async_trait]
pub trait MessageFormatter: Send + Sync {
    /// Format a reply's content for the delivery channel
    async fn format_for_whatsapp(&self, response: &AgentResponse) -> Result<String>;

    /// Produce the user-facing text for an internal error
    fn format_error_message(&self, err: &GatewayError) -> String;

    /// Validate inbound message content before it reaches the engine
    fn validate_message_content(&self, content: &str) -> Result<()>;
}

/// Markdown-to-WhatsApp formatter.
///
/// Conversions applied:
/// - `**bold**` / `__bold__` become `*bold*` / `_italic_`
/// - `~~strike~~` becomes `~strike~`
/// - `# headings` become bold lines
/// - `- item` bullets become `• item`
/// - `[label](url)` links become `label: url`
pub struct WhatsAppFormatter {
    max_message_length: usize,
}

impl WhatsAppFormatter {
    pub fn new(max_message_length: usize) -> Self {
        Self { max_message_length }
    }

    /// Convert markdown text to the WhatsApp dialect
    pub fn markdown_to_whatsapp(text: &str) -> String {
        let lines: Vec<String> = text.lines().map(Self::convert_line).collect();
        let joined = lines.join("\n");
        // Trailing newline is significant to `lines()`, restore it
        if text.ends_with('\n') {
            format!("{joined}\n")
        } else {
            joined
        }
    }

    fn convert_line(line: &str) -> String {
        let trimmed = line.trim_start();
        let indent_len = line.len() - trimmed.len();
        let indent = &line[..indent_len];

        // Headings become bold lines
        if trimmed.starts_with('#') {
            let text = trimmed.trim_start_matches('#').trim();
            if text.is_empty() {
                return String::new();
            }
            return format!("{indent}*{}*", Self::convert_inline(text));
        }

        // Markdown bullets become the WhatsApp bullet glyph
        if let Some(rest) = trimmed.strip_prefix("- ") {
            return format!("{indent}• {}", Self::convert_inline(rest));
        }

        format!("{indent}{}", Self::convert_inline(trimmed))
    }

    fn convert_inline(text: &str) -> String {
        let converted = text
            .replace("**", "*")
            .replace("__", "_")
            .replace("~~", "~");
        Self::convert_links(&converted)
    }

    /// Rewrite `[label](url)` as `label: url`
    fn convert_links(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('[') {
            let Some(close_rel) = rest[open..].find("](") else {
                break;
            };
            let close = open + close_rel;
            let Some(end_rel) = rest[close + 2..].find(')') else {
                break;
            };
            let end = close + 2 + end_rel;

            let label = &rest[open + 1..close];
            let url = &rest[close + 2..end];

            out.push_str(&rest[..open]);
            out.push_str(label);
            out.push_str(": ");
            out.push_str(url);
            rest = &rest[end + 1..];
        }

        out.push_str(rest);
        out
    }
}

impl Default for WhatsAppFormatter {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl MessageFormatter for WhatsAppFormatter {
    async fn format_for_whatsapp(&self, response: &AgentResponse) -> Result<String> {
        Ok(Self::markdown_to_whatsapp(&response.content))
    }

    fn format_error_message(&self, _err: &GatewayError) -> String {
        // User-facing text never leaks internal error detail
        "Desculpe, não consegui processar sua mensagem agora. \
         Tente novamente em alguns instantes."
            .to_string()
    }

    fn validate_message_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(GatewayError::InvalidContent(
                "message content cannot be empty".to_string(),
            ));
        }
        if content.len() > self.max_message_length {
            return Err(GatewayError::InvalidContent(format!(
                "message content exceeds maximum length of {} characters",
                self.max_message_length
            )));
        }
        Ok(())
    }
}

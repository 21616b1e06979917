//! End-to-end pipeline tests against in-memory capability doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::config::PipelineConfig;
use crate::models::{
    AgentResponse, MessageType, ProcessedMessageData, QueueMessage, TaskStatus,
};
use crate::services::engine::AgentEngineClient;
use crate::services::formatter::WhatsAppFormatter;
use crate::services::store::InMemoryStore;
use crate::services::transcribe::TranscribeService;
use crate::worker::processor::MessageProcessor;
use crate::{GatewayError, Result};

/// Scripted engine double that records what it was asked.
struct MockEngine {
    reply: String,
    calls: AtomicUsize,
    last_text: Mutex<Option<String>>,
    fail: bool,
}

impl MockEngine {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            last_text: Mutex::new(None),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            calls: AtomicUsize::new(0),
            last_text: Mutex::new(None),
            fail: true,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_text(&self) -> Option<String> {
        self.last_text.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentEngineClient for MockEngine {
    async fn get_or_create_thread(&self, user_key: &str) -> Result<String> {
        Ok(user_key.to_string())
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<AgentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some(text.to_string());
        if self.fail {
            return Err(GatewayError::Engine("engine unreachable".to_string()));
        }
        Ok(AgentResponse {
            content: self.reply.clone(),
            message_id: "reply-1".to_string(),
            thread_id: thread_id.to_string(),
        })
    }
}

struct MockTranscriber {
    transcript: Result<String>,
}

impl MockTranscriber {
    fn returning(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Ok(transcript.to_string()),
        })
    }
}

#[async_trait]
impl TranscribeService for MockTranscriber {
    async fn transcribe_audio(&self, _audio_url: &str) -> Result<String> {
        match &self.transcript {
            Ok(t) => Ok(t.clone()),
            Err(e) => Err(GatewayError::Transcription(e.to_string())),
        }
    }

    fn is_audio_url(&self, url: &str) -> bool {
        crate::worker::audio::is_audio_reference(url)
    }

    fn validate_audio_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}

fn queue_message(text: &str) -> QueueMessage {
    QueueMessage {
        id: "msg-1".to_string(),
        user_number: "5511999999999".to_string(),
        message: text.to_string(),
        previous_message: None,
        provider: "google_agent_engine".to_string(),
        message_type: "text".to_string(),
    }
}

fn payload(msg: &QueueMessage) -> Vec<u8> {
    serde_json::to_vec(msg).unwrap()
}

const ENGINE_REPLY: &str = r#"{"output": {"messages": [
    {"type": "human", "content": "hello"},
    {"type": "ai", "content": "**Hi!** How can I help?", "response_metadata": {
        "model_name": "gemini-2.0-flash",
        "finish_reason": "STOP",
        "usage_metadata": {"input_tokens": 4, "output_tokens": 9, "total_tokens": 13}
    }}
]}}"#;

fn processor(store: Arc<InMemoryStore>, engine: Arc<MockEngine>) -> MessageProcessor {
    MessageProcessor::new(store, PipelineConfig::default())
        .with_engine(engine)
        .with_formatter(Arc::new(WhatsAppFormatter::default()))
}

#[tokio::test]
async fn happy_path_persists_result_and_terminal_status() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(
        store.status_history("msg-1"),
        vec![TaskStatus::Processing, TaskStatus::Completed]
    );
    assert!(store.error("msg-1").is_none());

    let data: ProcessedMessageData =
        serde_json::from_str(&store.result("msg-1").unwrap()).unwrap();
    assert_eq!(data.agent_id, "user_5511999999999");
    assert_eq!(data.processed_at, "msg-1");
    assert_eq!(data.status, "done");

    // Two chat messages plus the trailing usage record
    assert_eq!(data.messages.len(), 3);
    let usage = data.messages.last().unwrap().as_usage().unwrap();
    assert_eq!(usage.step_count, 2);
    assert_eq!(usage.agent_id, "user_5511999999999");

    // Channel formatting applied to the assistant message
    let assistant = data.messages[1].as_chat().unwrap();
    assert_eq!(assistant.message_type, MessageType::AssistantMessage);
    assert_eq!(assistant.content, Some(json!("*Hi!* How can I help?")));
    assert_eq!(
        assistant.usage_metadata.as_ref().unwrap().total_token_count,
        Some(13.0)
    );
}

#[tokio::test]
async fn unsupported_provider_fails_without_calling_the_engine() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let mut msg = queue_message("hello");
    msg.provider = "openai".to_string();
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store.result("msg-1").is_none());
    assert!(store.error("msg-1").unwrap().contains("openai"));
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn missing_engine_records_a_failure() {
    let store = Arc::new(InMemoryStore::new());
    let processor = MessageProcessor::new(store.clone(), PipelineConfig::default());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store
        .error("msg-1")
        .unwrap()
        .contains("agent engine client is required"));
}

#[tokio::test]
async fn audio_without_transcriber_falls_back_to_the_default_text() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("https://cdn.example.com/voice/note.ogg");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(engine.last_text(), Some("Ajuda".to_string()));
    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Completed));
}

#[tokio::test]
async fn audio_transcript_is_fed_to_the_engine() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone())
        .with_transcriber(MockTranscriber::returning("qual o horário de vocês?"));

    let msg = queue_message("https://cdn.example.com/voice/note.mp3");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(
        engine.last_text(),
        Some("qual o horário de vocês?".to_string())
    );
}

#[tokio::test]
async fn empty_transcript_falls_back_to_the_default_text() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor =
        processor(store.clone(), engine.clone()).with_transcriber(MockTranscriber::returning("  "));

    let msg = queue_message("https://cdn.example.com/voice/note.wav");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(engine.last_text(), Some("Ajuda".to_string()));
}

#[tokio::test]
async fn engine_error_is_recorded_and_the_delivery_is_still_acked() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::failing();
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    // Application failure must not surface to the queue layer
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store.result("msg-1").is_none());
    assert!(store.error("msg-1").unwrap().contains("engine unreachable"));
}

#[tokio::test]
async fn unparseable_engine_reply_records_a_parse_failure() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying("this is not JSON");
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store
        .error("msg-1")
        .unwrap()
        .contains("failed to parse AI response JSON"));
}

#[tokio::test]
async fn reply_without_output_object_records_a_format_failure() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(r#"{"result": "wrong shape"}"#);
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store
        .error("msg-1")
        .unwrap()
        .contains("invalid agent engine response format"));
}

#[tokio::test]
async fn reply_with_newlines_is_cleaned_before_parsing() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(
        "  {\"output\": {\"messages\": [\n{\"type\": \"ai\", \"content\": \"ok\"}\r\n]}}  ",
    );
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Completed));
    let data: ProcessedMessageData =
        serde_json::from_str(&store.result("msg-1").unwrap()).unwrap();
    assert_eq!(data.messages.len(), 2);
}

#[tokio::test]
async fn empty_message_content_records_a_validation_failure() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("   ");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(store.last_status("msg-1"), Some(TaskStatus::Failed));
    assert!(store.error("msg-1").unwrap().contains("invalid message content"));
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn undecodable_payload_surfaces_an_error() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let result = processor.handle_delivery(b"not json at all").await;
    assert!(matches!(result, Err(GatewayError::Serialization(_))));
    assert_eq!(engine.call_count(), 0);
}

#[tokio::test]
async fn store_write_failures_do_not_fail_the_delivery() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_writes(true);
    let engine = MockEngine::replying(ENGINE_REPLY);
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("hello");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    assert_eq!(engine.call_count(), 1);
    assert!(store.result("msg-1").is_none());
}

#[tokio::test]
async fn tool_call_round_trips_through_the_result_artifact() {
    let store = Arc::new(InMemoryStore::new());
    let engine = MockEngine::replying(
        r#"{"output": {"messages": [
            {"type": "ai", "content": "", "tool_calls": [
                {"id": "call-1", "name": "schedule_lookup", "args": {"day": "monday"}}
            ]},
            {"type": "tool", "name": "schedule_lookup", "content": "9h às 18h", "tool_call_id": "call-1"},
            {"type": "ai", "content": "Funcionamos das 9h às 18h."}
        ]}}"#,
    );
    let processor = processor(store.clone(), engine.clone());

    let msg = queue_message("qual o horário?");
    processor.handle_delivery(&payload(&msg)).await.unwrap();

    let data: ProcessedMessageData =
        serde_json::from_str(&store.result("msg-1").unwrap()).unwrap();

    let value = serde_json::to_value(&data.messages).unwrap();
    assert_eq!(value[0]["message_type"], "tool_call_message");
    assert_eq!(value[0]["tool_call"]["name"], "schedule_lookup");
    assert_eq!(value[1]["message_type"], "tool_return_message");
    assert_eq!(value[1]["tool_return"], "9h às 18h");
    assert_eq!(value[1]["status"], "success");
    assert_eq!(value[2]["message_type"], "assistant_message");
    assert_eq!(value[3]["message_type"], "usage_statistics");
    assert_eq!(value[3]["step_count"], 3);
}

//! Message processing orchestrator
//!
//! Runs the full pipeline for one queue delivery: decode the envelope,
//! mark the task processing, resolve audio content, call the agent
//! engine, transform the reply into the client schema, format it for the
//! channel, and persist the result plus a terminal status.
//!
//! ## Delivery contract
//!
//! Pipeline failures are terminal for the message: the error is recorded
//! in the task store and [`MessageProcessor::handle_delivery`] still
//! returns `Ok`, so the delivery is acknowledged and never redelivered.
//! Only an undecodable envelope returns `Err` — there is no message id to
//! record state against, so the queue layer decides what to do with it.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{PipelineConfig, SUPPORTED_PROVIDER};
use crate::models::{
    EngineReply, OutboundMessage, ProcessedMessageData, QueueMessage, TaskStatus,
};
use crate::services::engine::AgentEngineClient;
use crate::services::formatter::MessageFormatter;
use crate::services::store::TaskStore;
use crate::services::transcribe::TranscribeService;
use crate::worker::audio::AudioGate;
use crate::worker::formatting::apply_formatting;
use crate::worker::step_id::{RandomStepIds, StepIdGenerator};
use crate::worker::transform::transform_messages;
use crate::{GatewayError, Result};

/// The per-message pipeline with its injected capabilities.
///
/// Built once at startup and shared across deliveries. Optional
/// capabilities (engine, transcriber, formatter) degrade the pipeline
/// rather than fail construction; a worker without an engine records a
/// failure for every message it sees.
pub struct MessageProcessor {
    store: Arc<dyn TaskStore>,
    engine: Option<Arc<dyn AgentEngineClient>>,
    audio: AudioGate,
    formatter: Option<Arc<dyn MessageFormatter>>,
    step_ids: Arc<dyn StepIdGenerator>,
}

impl MessageProcessor {
    pub fn new(store: Arc<dyn TaskStore>, pipeline: PipelineConfig) -> Self {
        Self {
            store,
            engine: None,
            audio: AudioGate::new(None, pipeline.fallback_text.clone()),
            formatter: None,
            step_ids: Arc::new(RandomStepIds),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn AgentEngineClient>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn TranscribeService>) -> Self {
        let fallback = self.audio.fallback_text().to_string();
        self.audio = AudioGate::new(Some(transcriber), fallback);
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn MessageFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_step_ids(mut self, step_ids: Arc<dyn StepIdGenerator>) -> Self {
        self.step_ids = step_ids;
        self
    }

    /// Handle one raw queue delivery end to end.
    ///
    /// Returns `Err` only when the payload cannot be decoded into a
    /// [`QueueMessage`]; every pipeline failure is recorded against the
    /// message id and swallowed so the delivery is acknowledged.
    pub async fn handle_delivery(&self, payload: &[u8]) -> Result<()> {
        let message: QueueMessage = serde_json::from_slice(payload)?;
        info!(
            message_id = %message.id,
            user_number = %message.user_number,
            provider = %message.provider,
            "processing queue message"
        );

        if let Err(err) = self
            .store
            .set_task_status(&message.id, TaskStatus::Processing)
            .await
        {
            warn!(message_id = %message.id, error = %err, "failed to record processing status");
        }

        match self.process(&message).await {
            Ok(result) => {
                if let Err(err) = self.store.set_task_result(&message.id, &result).await {
                    warn!(message_id = %message.id, error = %err, "failed to persist result");
                }
                if let Err(err) = self
                    .store
                    .set_task_status(&message.id, TaskStatus::Completed)
                    .await
                {
                    warn!(message_id = %message.id, error = %err, "failed to record completed status");
                }
                info!(message_id = %message.id, "message processed");
            }
            Err(err) => {
                error!(message_id = %message.id, error = %err, "message processing failed");
                if let Err(store_err) = self
                    .store
                    .set_task_error(&message.id, &err.to_string())
                    .await
                {
                    warn!(message_id = %message.id, error = %store_err, "failed to record error");
                }
                if let Err(store_err) = self
                    .store
                    .set_task_status(&message.id, TaskStatus::Failed)
                    .await
                {
                    warn!(message_id = %message.id, error = %store_err, "failed to record failed status");
                }
            }
        }

        Ok(())
    }

    /// Run the pipeline for one decoded message, returning the serialized
    /// result artifact.
    pub async fn process(&self, message: &QueueMessage) -> Result<String> {
        if message.provider != SUPPORTED_PROVIDER {
            return Err(GatewayError::UnsupportedProvider(message.provider.clone()));
        }

        let engine = self
            .engine
            .as_ref()
            .ok_or(GatewayError::EngineUnavailable)?;

        let resolved = self.audio.resolve(&message.message).await;
        if resolved.transcribed {
            info!(message_id = %message.id, "audio transcribed");
        }

        if let Some(formatter) = &self.formatter {
            formatter.validate_message_content(&resolved.text)?;
        }

        let thread_id = engine.get_or_create_thread(&message.user_number).await?;
        let response = engine.send_message(&thread_id, &resolved.text).await?;

        let reply = EngineReply::from_raw_content(&response.content)?;
        let raw_messages = reply.output.message_list();

        let mut messages = transform_messages(raw_messages, self.step_ids.as_ref());

        let agent_id = format!("user_{}", message.user_number);
        if let Some(OutboundMessage::Usage(stats)) = messages.last_mut() {
            stats.agent_id = agent_id.clone();
        }

        apply_formatting(self.formatter.as_ref(), &mut messages).await;

        let data = ProcessedMessageData {
            messages,
            agent_id,
            processed_at: message.id.clone(),
            status: "done".to_string(),
        };
        Ok(serde_json::to_string(&data)?)
    }
}

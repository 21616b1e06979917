//! Queue worker
//!
//! JetStream pull consumer that feeds deliveries into the
//! [`MessageProcessor`]. Deliveries the processor handles (success or
//! recorded failure) are acked; only undecodable payloads are nak'd back
//! to the stream. Shutdown is cooperative via a cancellation token.

pub mod audio;
pub mod formatting;
pub mod processor;
pub mod step_id;
pub mod transform;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, PullConsumer},
    stream, AckKind,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::NatsConfig;
use crate::worker::processor::MessageProcessor;
use crate::{GatewayError, Result};

/// The queue-facing worker loop
pub struct Worker {
    consumer: PullConsumer,
    processor: Arc<MessageProcessor>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Bind to the message stream, creating the stream and the durable
    /// consumer if they do not exist yet.
    pub async fn connect(
        client: async_nats::Client,
        config: &NatsConfig,
        processor: Arc<MessageProcessor>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let js = jetstream::new(client);

        let stream = js
            .get_or_create_stream(stream::Config {
                name: config.stream.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| GatewayError::Queue(format!("failed to bind stream: {e}")))?;

        let consumer = stream
            .get_or_create_consumer(
                &config.consumer,
                pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| GatewayError::Queue(format!("failed to bind consumer: {e}")))?;

        info!(
            stream = %config.stream,
            subject = %config.subject,
            consumer = %config.consumer,
            "worker bound to message stream"
        );

        Ok(Self {
            consumer,
            processor,
            shutdown,
        })
    }

    /// Consume deliveries until the shutdown token fires.
    pub async fn run(self) -> Result<()> {
        let mut messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| GatewayError::Queue(format!("failed to open message stream: {e}")))?;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested, stopping worker");
                    return Ok(());
                }
                delivery = messages.next() => {
                    let Some(delivery) = delivery else {
                        warn!("message stream closed");
                        return Ok(());
                    };
                    let message = match delivery {
                        Ok(message) => message,
                        Err(e) => {
                            error!(error = %e, "failed to pull delivery");
                            continue;
                        }
                    };

                    // Dropping the in-flight pipeline future on shutdown
                    // aborts its network calls; the unacked delivery is
                    // redelivered to the next worker.
                    let handled = self
                        .shutdown
                        .run_until_cancelled(self.processor.handle_delivery(&message.payload))
                        .await;
                    match handled {
                        None => {
                            info!("shutdown requested mid-delivery, stopping worker");
                            return Ok(());
                        }
                        Some(Ok(())) => {
                            if let Err(e) = message.ack().await {
                                warn!(error = %e, "failed to ack delivery");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "undecodable delivery, requesting redelivery");
                            if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                                warn!(error = %e, "failed to nak delivery");
                            }
                        }
                    }
                }
            }
        }
    }
}

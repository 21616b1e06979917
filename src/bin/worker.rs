//! Queue worker entrypoint
//!
//! Loads configuration from the environment, wires the NATS-backed task
//! store and the optional engine/transcription/formatting capabilities
//! into the message processor, and runs the consumer loop until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agent_gateway::services::engine::GoogleAgentEngineClient;
use agent_gateway::services::formatter::WhatsAppFormatter;
use agent_gateway::services::store::{NatsTaskStore, TaskStore};
use agent_gateway::services::transcribe::HttpTranscribeClient;
use agent_gateway::worker::processor::MessageProcessor;
use agent_gateway::worker::Worker;
use agent_gateway::GatewayConfig;

#[derive(Parser, Debug)]
#[command(name = "worker", about = "Agent gateway queue worker")]
struct Args {
    /// NATS server URL (overrides GATEWAY__NATS__URL)
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Log filter directive
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let mut config = GatewayConfig::from_env()?;
    if let Some(url) = args.nats_url {
        config.nats.url = url;
    }

    info!(nats_url = %config.nats.url, "starting agent gateway worker");

    let client = async_nats::connect(&config.nats.url).await?;
    let jetstream = async_nats::jetstream::new(client.clone());

    let store: Arc<dyn TaskStore> =
        Arc::new(NatsTaskStore::connect(&jetstream, &config.store).await?);

    let mut processor = MessageProcessor::new(store.clone(), config.pipeline.clone())
        .with_formatter(Arc::new(WhatsAppFormatter::new(
            config.pipeline.max_message_length,
        )));

    if config.engine.is_configured() {
        let engine = GoogleAgentEngineClient::new(config.engine.clone())?.with_cache(store.clone());
        processor = processor.with_engine(Arc::new(engine));
    } else {
        warn!("agent engine not configured, messages will fail until it is");
    }

    if config.transcribe.is_configured() {
        let transcriber = HttpTranscribeClient::new(config.transcribe.clone())?;
        processor = processor.with_transcriber(Arc::new(transcriber));
    } else {
        warn!("transcription service not configured, audio messages will use the fallback text");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    let worker = Worker::connect(client, &config.nats, Arc::new(processor), shutdown).await?;
    worker.run().await?;

    info!("worker stopped");
    Ok(())
}

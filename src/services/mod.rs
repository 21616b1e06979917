// Capability adapters for external collaborators
// Each collaborator is consumed through a narrow trait so alternate
// backends can be substituted without touching the pipeline.

pub mod engine;
pub mod formatter;
pub mod store;
pub mod transcribe;

pub use engine::{AgentEngineClient, GoogleAgentEngineClient};
pub use formatter::{MessageFormatter, WhatsAppFormatter};
pub use store::{InMemoryStore, NatsTaskStore, TaskStore};
pub use transcribe::{HttpTranscribeClient, TranscribeService};

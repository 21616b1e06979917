// Domain models for the gateway pipeline
// Wire formats on the queue side, typed engine reply schema, and the
// client-facing message schema written to the result store.

pub mod engine;
pub mod message;
pub mod transformed;

pub use engine::{
    EngineOutput, EngineReply, RawEngineMessage, RawResponseMetadata, RawToolCall,
    RawUsageMetadata,
};
pub use message::{AgentResponse, ProcessedMessageData, QueueMessage, TaskStatus};
pub use transformed::{
    MessageType, OutboundMessage, ToolCallInfo, ToolReturnInfo, TransformedMessage,
    UsageMetadata, UsageStatistics,
};

//! Convenience re-exports for common use.

pub use crate::bridge::{EventBridge, EventSink, EventStream};
pub use crate::config::{Creativity, EncoreConfig};
pub use crate::conversation::{Conversation, Pipeline, MAX_TOOL_ROUNDS};
pub use crate::error::{EncoreError, Result};
pub use crate::model::{ChatDelta, ChatRequest, ChatResponse, ModelClient, OllamaClient};
pub use crate::retrieval::{NoRetriever, RetrievalQuery, RetrievedChunk, Retriever, StaticRetriever};
pub use crate::service::ChatService;
pub use crate::session::{Session, SessionStore};
pub use crate::thinking::ThinkingParser;
pub use crate::tools::{
    AgentTool, AgentToolParameters, Artifact, Tool, ToolArguments, ToolOutcome, ToolRegistry,
};
pub use crate::types::{Message, Role, SendOptions, StreamEvent, ToolCall};

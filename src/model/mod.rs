//! Language-model client trait and request/response types.

pub mod ollama;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::tools::ToolDefinition;
use crate::types::{Message, ToolCall};

pub use ollama::{ModelInfo, OllamaClient};

/// A chat request sent to the model runtime.
#[derive(Debug, Clone, Builder, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model. Empty means no tool use.
    #[builder(default)]
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f64>,
}

/// Complete (non-streaming) chat response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    /// Reasoning reported separately by the runtime, if any.
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// One increment of a streaming chat response.
///
/// Tool calls are only ever attached to the terminal delta (`done == true`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDelta {
    pub content: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
}

impl ChatDelta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            thinking: Some(text.into()),
            ..Default::default()
        }
    }

    /// Terminal delta, optionally carrying tool calls.
    pub fn done(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            done: true,
            ..Default::default()
        }
    }
}

/// Core trait implemented by model runtimes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier this client serves.
    fn model_id(&self) -> &str;

    /// Generate a full response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Generate a response incrementally.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta>>>;
}

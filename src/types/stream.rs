//! Events emitted to the transport during an exchange.

use serde::{Deserialize, Serialize};

/// A typed event produced while an exchange runs.
///
/// Emission order is meaningful: a consumer must render events in the order
/// received and never regroup them by kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible assistant text.
    Token { text: String },
    /// Progress notice (retrieval, tool execution, ...).
    Status {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// A completed tool invocation.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
        result: serde_json::Value,
    },
    /// Model reasoning, not intended as the final answer.
    Thinking { text: String },
    /// Typed byproduct derived from a tool result (e.g. a generated file).
    Part {
        kind: String,
        data: serde_json::Value,
    },
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    pub fn status(step: impl Into<String>, detail: Option<String>) -> Self {
        Self::Status {
            step: step.into(),
            detail,
        }
    }

    /// Short name of the event kind, as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Status { .. } => "status",
            Self::ToolCall { .. } => "tool_call",
            Self::Thinking { .. } => "thinking",
            Self::Part { .. } => "part",
        }
    }

    /// Text payload for `Token` and `Thinking` events.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Token { text } | Self::Thinking { text } => Some(text),
            _ => None,
        }
    }
}

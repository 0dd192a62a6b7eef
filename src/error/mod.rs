//! Error types for Encore.

use thiserror::Error;

/// Primary error type for all Encore operations.
#[derive(Error, Debug)]
pub enum EncoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Model unavailable: {message}")]
    ModelUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Model API error (status {status}): {message}")]
    ModelApi { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session {0} already has an exchange in progress")]
    SessionBusy(String),

    #[error("Exchange cancelled")]
    Cancelled,

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Retrieval,
    Model,
    Network,
    Timeout,
    Tool,
    Session,
    Cancelled,
    Serialization,
    Unknown,
}

impl EncoreError {
    /// Create a model-unavailable error without an underlying source.
    pub fn model_unavailable(message: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Retrieval(_) => ErrorCategory::Retrieval,
            Self::ModelUnavailable { .. } | Self::ModelApi { .. } | Self::Stream(_) => {
                ErrorCategory::Model
            }
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::UnknownTool(_) | Self::ToolExecution { .. } | Self::InvalidArgument(_) => {
                ErrorCategory::Tool
            }
            Self::SessionBusy(_) => ErrorCategory::Session,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelApi { status, .. } => matches!(status, 429 | 500..=599),
            _ => matches!(
                self.category(),
                ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::Session
            ),
        }
    }

    /// Whether this error ends the current exchange.
    ///
    /// Retrieval and tool errors are absorbed by the exchange and never
    /// reach the transport.
    pub fn is_fatal_to_exchange(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Retrieval | ErrorCategory::Tool
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, EncoreError>;

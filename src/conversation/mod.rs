//! Per-session dialogue state and exchange orchestration.
//!
//! One exchange runs: retrieval, system prompt composition, a streaming model
//! call, then up to [`MAX_TOOL_ROUNDS`] rounds of tool execution and model
//! re-invocation. History is committed only once the exchange finishes.

mod pipeline;

pub use pipeline::Pipeline;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::bridge::EventSink;
use crate::error::{EncoreError, Result};
use crate::model::{ChatDelta, ChatRequest};
use crate::prompt::build_system_prompt;
use crate::retrieval::{RetrievalQuery, RetrievedChunk};
use crate::thinking::ThinkingParser;
use crate::tools::{Artifact, ToolExecutionContext};
use crate::types::{Message, SendOptions, StreamEvent, ToolCall};
use crate::util::with_timeout;

/// Tool rounds allowed per user turn. The model is called at most
/// `MAX_TOOL_ROUNDS + 1` times per exchange.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Where exchange events go.
enum Output<'a> {
    Stream(&'a EventSink<StreamEvent>),
    Silent,
}

impl Output<'_> {
    async fn emit(&self, event: StreamEvent) -> Result<()> {
        match self {
            Self::Stream(sink) => sink.emit(event).await,
            Self::Silent => Ok(()),
        }
    }

    fn checkpoint(&self) -> Result<()> {
        match self {
            Self::Stream(sink) => sink.checkpoint(),
            Self::Silent => Ok(()),
        }
    }

    /// Next model delta, abandoned as soon as the consumer cancels.
    async fn next_delta(
        &self,
        stream: &mut BoxStream<'static, Result<ChatDelta>>,
    ) -> Result<Option<Result<ChatDelta>>> {
        match self {
            Self::Stream(sink) => tokio::select! {
                biased;
                _ = sink.cancelled() => Err(EncoreError::Cancelled),
                delta = stream.next() => Ok(delta),
            },
            Self::Silent => Ok(stream.next().await),
        }
    }
}

/// Visible text and requested tools from one model call.
struct ModelTurn {
    text: String,
    tool_calls: Vec<ToolCall>,
}

/// Map any model-side failure onto `ModelUnavailable`.
fn model_failure(err: EncoreError) -> EncoreError {
    match err {
        EncoreError::Cancelled | EncoreError::ModelUnavailable { .. } => err,
        other => EncoreError::ModelUnavailable {
            message: format!("model call failed: {other}"),
            source: Some(Box::new(other)),
        },
    }
}

/// Dialogue history of one session.
#[derive(Debug)]
pub struct Conversation {
    pipeline: Pipeline,
    session_id: String,
    history: Vec<Message>,
    artifacts: Vec<Artifact>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            session_id: session_id.into(),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Owned copy of the committed history.
    pub fn history(&self) -> Vec<Message> {
        self.history.clone()
    }

    /// Artifacts produced by the most recent exchange.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.artifacts.clear();
    }

    /// Run one exchange, emitting events to `sink` as they are produced.
    /// Returns the final visible assistant text.
    pub async fn send_stream(
        &mut self,
        user_message: &str,
        options: &SendOptions,
        sink: &EventSink<StreamEvent>,
    ) -> Result<String> {
        self.exchange(user_message, options, Output::Stream(sink)).await
    }

    /// Run one exchange without per-token events.
    pub async fn send(&mut self, user_message: &str, options: &SendOptions) -> Result<String> {
        self.exchange(user_message, options, Output::Silent).await
    }

    async fn exchange(
        &mut self,
        user_message: &str,
        options: &SendOptions,
        out: Output<'_>,
    ) -> Result<String> {
        self.artifacts.clear();
        let pipeline = self.pipeline.clone();
        let config = pipeline.config();
        tracing::debug!(
            session = %self.session_id,
            history = self.history.len(),
            "starting exchange"
        );

        let chunks = self.retrieve(user_message, options, &out).await?;
        let system = build_system_prompt(&config.persona, &chunks, options.context_summary.as_deref());

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(user_message));

        let mut pending = vec![Message::user(user_message)];
        let mut artifacts = Vec::new();
        let definitions = pipeline.tools().definitions();
        let temperature = options.temperature.unwrap_or(config.temperature);
        let ctx = ToolExecutionContext {
            session_id: Some(self.session_id.clone()),
            call_id: None,
        };

        let mut round = 0;
        let final_text = loop {
            let offer_tools = round < MAX_TOOL_ROUNDS && !definitions.is_empty();
            let request = ChatRequest {
                messages: messages.clone(),
                tools: if offer_tools { definitions.clone() } else { Vec::new() },
                temperature: Some(temperature),
            };
            let turn = self.call_model(&request, &out).await?;
            if !offer_tools || turn.tool_calls.is_empty() {
                if !turn.tool_calls.is_empty() {
                    tracing::debug!(
                        session = %self.session_id,
                        ignored = turn.tool_calls.len(),
                        "tool round limit reached; ignoring further tool calls"
                    );
                }
                break turn.text;
            }

            round += 1;
            tracing::debug!(
                session = %self.session_id,
                round,
                tools = turn.tool_calls.len(),
                "executing tool round"
            );
            let assistant = Message::assistant_with_tool_calls(turn.text, turn.tool_calls.clone());
            messages.push(assistant.clone());
            pending.push(assistant);

            for call in &turn.tool_calls {
                out.checkpoint()?;
                let label = pipeline.tools().status_label(call);
                out.emit(StreamEvent::status("tool", Some(label))).await?;

                let outcome = pipeline.tools().dispatch(call, &ctx).await;
                out.emit(StreamEvent::ToolCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: outcome.value.clone(),
                })
                .await?;
                for artifact in &outcome.artifacts {
                    out.emit(StreamEvent::Part {
                        kind: artifact.kind.clone(),
                        data: artifact.to_part_data(),
                    })
                    .await?;
                }

                artifacts.extend(outcome.artifacts.iter().cloned());
                messages.push(Message::tool_result(&call.name, outcome.to_content()));
                pending.push(Message::tool_result(&call.name, outcome.condense()));
            }
        };

        out.checkpoint()?;
        pending.push(Message::assistant(final_text.clone()));
        self.history.extend(pending);
        self.artifacts = artifacts;
        tracing::debug!(
            session = %self.session_id,
            rounds = round,
            artifacts = self.artifacts.len(),
            "exchange committed"
        );
        Ok(final_text)
    }

    /// Top-K reference chunks. Failure degrades to no context.
    async fn retrieve(
        &self,
        user_message: &str,
        options: &SendOptions,
        out: &Output<'_>,
    ) -> Result<Vec<RetrievedChunk>> {
        let config = self.pipeline.config();
        let k = options.top_k.unwrap_or(config.retrieval_k);
        if k == 0 {
            return Ok(Vec::new());
        }
        out.emit(StreamEvent::status("retrieving", None)).await?;

        let query = RetrievalQuery::new(user_message, k).with_category(options.category_filter.clone());
        match with_timeout(config.retrieval_timeout(), self.pipeline.retriever.search(&query)).await {
            Ok(chunks) => Ok(chunks),
            Err(err) => {
                tracing::warn!(
                    session = %self.session_id,
                    error = %err,
                    "retrieval failed; continuing without context"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn call_model(&self, request: &ChatRequest, out: &Output<'_>) -> Result<ModelTurn> {
        let model = &self.pipeline.model;
        let mut parser = ThinkingParser::new();

        if let Output::Silent = out {
            let response = model.chat(request).await.map_err(model_failure)?;
            parser.feed(&response.content);
            parser.flush();
            return Ok(ModelTurn {
                text: parser.clean_text(),
                tool_calls: response.tool_calls,
            });
        }

        let mut stream = model.chat_stream(request).await.map_err(model_failure)?;
        let mut tool_calls = Vec::new();
        while let Some(delta) = out.next_delta(&mut stream).await? {
            let delta = delta.map_err(model_failure)?;
            if let Some(thinking) = delta.thinking.filter(|t| !t.is_empty()) {
                out.emit(StreamEvent::Thinking { text: thinking }).await?;
            }
            for event in parser.feed(&delta.content) {
                out.emit(event).await?;
            }
            if delta.done {
                tool_calls = delta.tool_calls;
                break;
            }
        }
        for event in parser.flush() {
            out.emit(event).await?;
        }

        Ok(ModelTurn {
            text: parser.clean_text(),
            tool_calls,
        })
    }
}

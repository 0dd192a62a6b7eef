//! Shared test helpers: scripted model, retrievers and tools.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use encore::bridge::EventStream;
use encore::config::EncoreConfig;
use encore::conversation::Pipeline;
use encore::error::EncoreError;
use encore::model::{ChatDelta, ChatRequest, ChatResponse, ModelClient};
use encore::retrieval::{RetrievalQuery, RetrievedChunk, Retriever};
use encore::tools::{AgentTool, AgentToolParameters, ToolRegistry};
use encore::types::{StreamEvent, ToolCall};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Script {
    Deltas(Vec<ChatDelta>),
    /// Each delta is delayed before delivery.
    Slow(Vec<ChatDelta>, Duration),
    /// The call itself fails.
    Fail(String),
    /// Deltas are delivered, then the stream errors.
    FailMidStream(Vec<ChatDelta>, String),
}

/// Split text into small deltas, as a real runtime would.
pub fn text_deltas(text: &str) -> Vec<ChatDelta> {
    let chars: Vec<char> = text.chars().collect();
    let mut deltas: Vec<ChatDelta> = chars
        .chunks(4)
        .map(|chunk| ChatDelta::text(chunk.iter().collect::<String>()))
        .collect();
    deltas.push(ChatDelta::done(Vec::new()));
    deltas
}

/// A model that replays queued scripts and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Mutex<Option<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// Queue a plain text reply.
    pub fn reply(&self, text: &str) -> &Self {
        self.push(Script::Deltas(text_deltas(text)))
    }

    /// Queue a reply that requests one tool call.
    pub fn tool_call(&self, name: &str, args: serde_json::Value) -> &Self {
        self.push(Script::Deltas(vec![ChatDelta::done(vec![ToolCall::new(name, args)])]))
    }

    /// Queue a reply that requests several tool calls.
    pub fn tool_calls(&self, calls: Vec<(&str, serde_json::Value)>) -> &Self {
        let calls = calls.into_iter().map(|(n, a)| ToolCall::new(n, a)).collect();
        self.push(Script::Deltas(vec![ChatDelta::done(calls)]))
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.push(Script::Fail(message.to_string()))
    }

    /// Script used once the queue is empty.
    pub fn always(&self, script: Script) -> &Self {
        *self.fallback.lock().unwrap() = Some(script);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &ChatRequest) -> Script {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(script) = self.scripts.lock().unwrap().pop_front() {
            return script;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Script::Deltas(text_deltas("Mock response")))
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> encore::error::Result<ChatResponse> {
        let deltas = match self.next(request) {
            Script::Deltas(deltas) | Script::Slow(deltas, _) => deltas,
            Script::Fail(message) | Script::FailMidStream(_, message) => {
                return Err(EncoreError::ModelApi {
                    status: 500,
                    message,
                })
            }
        };
        let mut response = ChatResponse::default();
        for delta in deltas {
            response.content.push_str(&delta.content);
            if let Some(thinking) = delta.thinking {
                response.thinking.get_or_insert_with(String::new).push_str(&thinking);
            }
            response.tool_calls.extend(delta.tool_calls);
        }
        Ok(response)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> encore::error::Result<BoxStream<'static, encore::error::Result<ChatDelta>>> {
        match self.next(request) {
            Script::Deltas(deltas) => Ok(futures::stream::iter(deltas.into_iter().map(Ok)).boxed()),
            Script::Slow(deltas, delay) => Ok(futures::stream::iter(deltas)
                .then(move |delta| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, EncoreError>(delta)
                })
                .boxed()),
            Script::Fail(message) => Err(EncoreError::model_unavailable(message)),
            Script::FailMidStream(deltas, message) => Ok(futures::stream::iter(deltas.into_iter().map(Ok))
                .chain(futures::stream::once(async move {
                    Err(EncoreError::Stream(message))
                }))
                .boxed()),
        }
    }
}

/// Retriever that always fails.
pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn search(&self, _query: &RetrievalQuery) -> encore::error::Result<Vec<RetrievedChunk>> {
        Err(EncoreError::Retrieval("index offline".into()))
    }
}

/// Retriever that never answers in time.
pub struct HangingRetriever;

#[async_trait]
impl Retriever for HangingRetriever {
    async fn search(&self, _query: &RetrievalQuery) -> encore::error::Result<Vec<RetrievedChunk>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Retriever returning fixed chunks and recording queries.
#[derive(Default)]
pub struct RecordingRetriever {
    pub chunks: Vec<RetrievedChunk>,
    pub queries: Mutex<Vec<RetrievalQuery>>,
}

#[async_trait]
impl Retriever for RecordingRetriever {
    async fn search(&self, query: &RetrievalQuery) -> encore::error::Result<Vec<RetrievedChunk>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.chunks.clone())
    }
}

pub fn echo_tool() -> AgentTool {
    AgentTool::new(
        "echo",
        "Echo the text back",
        AgentToolParameters::object().string("text", "Text to echo", true).build(),
        |args, _ctx| async move { Ok(serde_json::json!({ "echo": args.get_str("text")? })) },
    )
}

pub fn failing_tool() -> AgentTool {
    AgentTool::new("explode", "Always fails", AgentToolParameters::empty(), |_args, _ctx| async {
        Err(EncoreError::tool("explode", "kaboom"))
    })
    .with_status_label("Detonating")
}

/// Tool whose result declares a generated file.
pub fn render_tool() -> AgentTool {
    AgentTool::new(
        "render",
        "Render a file",
        AgentToolParameters::object().string("name", "File name", true).build(),
        |args, _ctx| async move {
            let name = args.get_str("name")?;
            Ok(serde_json::json!({
                "file_path": format!("out/{name}.mid"),
                "notes": (0..200).collect::<Vec<u32>>(),
            }))
        },
    )
}

pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .with(echo_tool())
        .and_then(|r| r.with(failing_tool()))
        .and_then(|r| r.with(render_tool()))
        .expect("distinct tool names")
}

pub fn test_config() -> EncoreConfig {
    EncoreConfig {
        persona: "You are a test persona.".into(),
        retrieval_timeout_ms: 200,
        ..EncoreConfig::default()
    }
}

pub fn pipeline(model: Arc<ScriptedModel>) -> Pipeline {
    Pipeline::new(model, test_config()).with_tools(registry())
}

/// Drain a stream into events and the optional terminal error.
pub async fn drain(mut stream: EventStream<StreamEvent>) -> (Vec<StreamEvent>, Option<EncoreError>) {
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => events.push(event),
            Err(err) => return (events, Some(err)),
        }
    }
    (events, None)
}

/// Concatenated `Token` text.
pub fn visible_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    let mut kinds: Vec<&'static str> = Vec::new();
    for event in events {
        let kind = event.kind();
        if kinds.last() != Some(&kind) || !matches!(kind, "token" | "thinking") {
            kinds.push(kind);
        }
    }
    kinds
}

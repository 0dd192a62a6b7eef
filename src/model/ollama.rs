//! Ollama native chat client (`/api/chat`, NDJSON streaming).

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;

use super::{ChatDelta, ChatRequest, ChatResponse, ModelClient};
use crate::error::{EncoreError, Result};
use crate::types::{Message, Role, ToolCall};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

/// A model installed on the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, model)
    }

    pub fn with_http_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the server answers at all.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Models available on the server.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(&self.base_url, e))?;
        let response = check_status(response).await?;
        let tags: Tags = response.json().await?;
        Ok(tags.models)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            body["options"] = serde_json::json!({ "temperature": temperature });
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }

    async fn post_chat(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(model = %self.model, %url, "sending chat request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| unavailable(&self.base_url, e))?;
        check_status(response).await
    }
}

fn unavailable(base_url: &str, err: reqwest::Error) -> EncoreError {
    EncoreError::ModelUnavailable {
        message: format!("could not reach Ollama at {base_url}"),
        source: Some(Box::new(err)),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    Err(EncoreError::ModelApi {
        status: status.as_u16(),
        message,
    })
}

fn wire_message(message: &Message) -> serde_json::Value {
    let mut wire = serde_json::json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if message.role == Role::Assistant && message.has_tool_calls() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                serde_json::json!({
                    "function": { "name": call.name, "arguments": call.arguments }
                })
            })
            .collect();
    }
    if let Some(name) = &message.tool_name {
        wire["tool_name"] = serde_json::json!(name);
    }
    wire
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        let mut converted = ToolCall::new(call.function.name, call.function.arguments);
        if let Some(id) = call.id {
            converted.id = id;
        }
        converted
    }
}

/// Accumulates raw bytes and hands out complete `\n`-terminated lines.
/// A multi-byte character split across chunks stays intact until its line completes.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
        line.pop();
        Some(line)
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self.post_chat(&self.build_body(request, false)).await?;
        let wire: WireResponse = response.json().await?;
        if let Some(error) = wire.error {
            return Err(EncoreError::Stream(error));
        }
        let message = wire.message.unwrap_or_default();
        Ok(ChatResponse {
            content: message.content,
            thinking: non_empty(message.thinking),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCall::from)
                .collect(),
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<ChatDelta>>> {
        let response = self.post_chat(&self.build_body(request, true)).await?;
        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = LineBuffer::default();
            let mut pending_calls: Vec<ToolCall> = Vec::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(EncoreError::ModelUnavailable {
                            message: "model stream interrupted".into(),
                            source: Some(Box::new(e)),
                        });
                        return;
                    }
                };

                lines.push(&chunk);

                while let Some(raw) = lines.next_line() {
                    let line = match std::str::from_utf8(&raw) {
                        Ok(line) => line.trim(),
                        Err(e) => {
                            yield Err(EncoreError::Stream(format!("stream line is not UTF-8: {e}")));
                            return;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }

                    let wire = match serde_json::from_str::<WireResponse>(line) {
                        Ok(wire) => wire,
                        Err(e) => {
                            yield Err(EncoreError::Stream(format!("malformed stream line: {e}")));
                            return;
                        }
                    };
                    if let Some(error) = wire.error {
                        yield Err(EncoreError::Stream(error));
                        return;
                    }

                    let message = wire.message.unwrap_or_default();
                    if let Some(calls) = message.tool_calls {
                        pending_calls.extend(calls.into_iter().map(ToolCall::from));
                    }
                    let thinking = non_empty(message.thinking);
                    if !message.content.is_empty() || thinking.is_some() {
                        yield Ok(ChatDelta {
                            content: message.content,
                            thinking,
                            ..Default::default()
                        });
                    }
                    if wire.done {
                        yield Ok(ChatDelta::done(std::mem::take(&mut pending_calls)));
                        return;
                    }
                }
            }

            yield Err(EncoreError::Stream("model stream ended before completion".into()));
        };

        Ok(Box::pin(stream))
    }
}

//! OpenAI-compatible Chat Completions backend

use std::collections::HashMap;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ChatBackend, required_env};
use crate::{
    error::{Error, Result},
    stream::ChunkStream,
    types::{
        CapabilitySchema, ChatRequest, Chunk, Delta, FinishReason, Message, Role, ToolCallFragment,
    },
};

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
}

impl OpenAIConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            headers: HashMap::new(),
        }
    }

    /// Read `AI_URL`, `AI_KEY` and `AI_MODEL`
    pub fn from_env() -> Result<Self> {
        let base_url = required_env("AI_URL")?;
        let api_key = required_env("AI_KEY").map_err(|_| Error::InvalidApiKey)?;
        let model = required_env("AI_MODEL")?;
        Ok(Self::new(base_url, api_key, model))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Streams chat completions from an OpenAI-compatible server
pub struct OpenAIBackend {
    client: reqwest::Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create from `AI_URL`, `AI_KEY` and `AI_MODEL`
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenAIConfig::from_env()?))
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let bearer = format!("Bearer {}", self.config.api_key)
            .parse()
            .map_err(|_| Error::InvalidApiKey)?;
        headers.insert(reqwest::header::AUTHORIZATION, bearer);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        for (key, value) in &self.config.headers {
            match (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(val)) => {
                    headers.insert(name, val);
                }
                _ => tracing::warn!(header = %key, "skipping invalid extra header"),
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl ChatBackend for OpenAIBackend {
    async fn stream(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ChunkStream> {
        let body = build_request(&self.config, request);
        let url = self.config.completions_url();
        tracing::debug!(
            url = %url,
            model = %self.config.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "opening chat completion stream"
        );

        let request_builder = self.client.post(&url).headers(self.headers()?).json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source, cancel)))
    }
}

fn build_request(config: &OpenAIConfig, request: &ChatRequest) -> OpenAIRequest {
    let messages = request.messages.iter().map(convert_message).collect();

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(request.tools.iter().map(convert_tool).collect())
    };

    let has_tools = tools.is_some();
    OpenAIRequest {
        model: config.model.clone(),
        messages,
        stream: true,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        tools,
        tool_choice: has_tools.then(|| serde_json::json!("auto")),
    }
}

fn convert_tool(schema: &CapabilitySchema) -> OpenAITool {
    OpenAITool {
        tool_type: "function".to_string(),
        function: OpenAIFunction {
            name: schema.name.clone(),
            description: Some(schema.description.clone()),
            parameters: Some(schema.parameters.clone()),
        },
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    let tool_calls = if msg.has_tool_calls() {
        Some(
            msg.tool_calls
                .iter()
                .map(|call| OpenAIToolCall {
                    id: call.id.clone(),
                    call_type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    } else {
        None
    };

    // Assistant turns that only invoke capabilities carry a null content
    let content = if tool_calls.is_some() && msg.content.is_empty() {
        None
    } else {
        Some(msg.content.clone())
    };

    OpenAIMessage {
        role: msg.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: match msg.role {
            Role::Tool => msg.tool_call_id.clone(),
            _ => None,
        },
    }
}

/// Split one wire chunk into single-payload chunks.
///
/// Text comes first, then each tool-call fragment in wire order. The finish
/// reason rides on the last piece so it stays the final thing observed.
fn split_chunk(chunk: StreamChunk) -> Vec<Chunk> {
    let turn_id = chunk.id.unwrap_or_default();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return vec![Chunk::empty(turn_id)];
    };

    let mut pieces = Vec::new();
    if let Some(delta) = choice.delta {
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            pieces.push(Chunk::text(turn_id.clone(), text));
        }
        for tc in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            pieces.push(Chunk {
                turn_id: turn_id.clone(),
                delta: Delta::ToolCall(ToolCallFragment {
                    call_id: tc.id.filter(|id| !id.is_empty()),
                    name,
                    arguments,
                }),
                finish_reason: None,
            });
        }
    }

    if pieces.is_empty() {
        pieces.push(Chunk::empty(turn_id));
    }
    if let (Some(reason), Some(last)) = (choice.finish_reason.as_deref(), pieces.last_mut()) {
        last.finish_reason = Some(FinishReason::parse(reason));
    }
    pieces
}

/// Pull a human-readable message out of an error body
fn extract_error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    match json.get("error") {
        Some(error) => error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        None => body.trim().to_string(),
    }
}

fn create_stream(
    mut event_source: EventSource,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = Result<Chunk>> {
    stream! {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("chat stream cancelled, closing connection");
                    break;
                }
                event = event_source.next() => event,
            };
            let Some(event) = event else { break };

            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data.trim() == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            for piece in split_chunk(chunk) {
                                yield Ok(piece);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(data = %msg.data, "failed to parse stream chunk");
                            yield Err(Error::Json(e));
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(Error::api(
                        format!("http_{}", status.as_u16()),
                        extract_error_message(&body),
                    ));
                    break;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
        event_source.close();
    }
}

// Request types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

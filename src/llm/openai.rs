use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChatProvider, ChatRequest, DeltaStream, FunctionSchema, Message, Role, StreamDelta};
use crate::config::LlmConfig;
use crate::error::{ConfigError, ProviderError};

pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, ConfigError> {
        let client = Client::builder().build().map_err(ConfigError::HttpClient)?;
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        Self::new(config.api_key()?, config.model(), config.base_url())
    }

    fn post(&self, body: &OaiRequest<'_>, timeout: Duration) -> Result<Response, ProviderError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        debug!(%endpoint, model = %self.model, stream = body.stream, "calling provider");

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }
        Ok(resp)
    }
}

#[derive(Serialize)]
struct OaiRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "no_functions")]
    functions: &'a [FunctionSchema],
    stream: bool,
}

fn no_functions(functions: &&[FunctionSchema]) -> bool {
    functions.is_empty()
}

/// Lay out history the way the chat-completions API expects it. A function
/// result is preceded by the assistant turn that requested it.
fn wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut payload = Vec::with_capacity(messages.len() + 1);
    for m in messages {
        match (m.role, &m.function_call_name) {
            (Role::Function, Some(call_name)) => {
                payload.push(json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "function_call": {
                        "name": call_name,
                        "arguments": m.function_call_arguments.as_deref().unwrap_or("{}"),
                    },
                }));
                payload.push(json!({
                    "role": "function",
                    "name": m.name.as_deref().unwrap_or(call_name),
                    "content": m.content,
                }));
            }
            (Role::Function, None) => {
                payload.push(json!({
                    "role": "function",
                    "name": m.name.as_deref().unwrap_or_default(),
                    "content": m.content,
                }));
            }
            (role, _) => {
                payload.push(json!({ "role": role.as_str(), "content": m.content }));
            }
        }
    }
    payload
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

// Data structures for streaming responses
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    function: Option<WireFunctionCall>,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(StreamDelta),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    // SSE format: data lines start with "data:"
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk = match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, data, "skipping unparseable stream chunk");
            return SseLine::Skip;
        }
    };
    let Some(choice) = chunk.choices.into_iter().next() else {
        return SseLine::Skip;
    };

    let WireDelta {
        content,
        function_call,
        tool_calls,
    } = choice.delta;
    let call = function_call.or_else(|| {
        tool_calls
            .and_then(|calls| calls.into_iter().next())
            .and_then(|call| call.function)
    });

    match call {
        Some(call) => SseLine::Delta(StreamDelta::function(
            call.name.as_deref(),
            call.arguments.as_deref(),
        )),
        None => SseLine::Delta(StreamDelta {
            content,
            ..StreamDelta::default()
        }),
    }
}

struct SseDeltas {
    lines: Lines<BufReader<Response>>,
    timeout: Duration,
    done: bool,
}

impl Iterator for SseDeltas {
    type Item = Result<StreamDelta, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ProviderError::from_io(e, self.timeout)));
                }
            };
            match parse_sse_line(&line) {
                SseLine::Delta(delta) => return Some(Ok(delta)),
                SseLine::Done => {
                    self.done = true;
                    return None;
                }
                SseLine::Skip => continue,
            }
        }
    }
}

impl ChatProvider for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn query(&self, request: ChatRequest<'_>) -> Result<Message, ProviderError> {
        let body = OaiRequest {
            model: &self.model,
            messages: wire_messages(request.messages),
            functions: request.functions,
            stream: false,
        };
        let resp = self.post(&body, request.timeout)?;
        let parsed: CompletionResponse = resp
            .json()
            .map_err(|e| ProviderError::from_reqwest(e, request.timeout))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;
        Ok(Message::new(
            Role::Assistant,
            choice.message.content.unwrap_or_default(),
        ))
    }

    fn stream(&self, request: ChatRequest<'_>) -> Result<DeltaStream, ProviderError> {
        let body = OaiRequest {
            model: &self.model,
            messages: wire_messages(request.messages),
            functions: request.functions,
            stream: true,
        };
        let resp = self.post(&body, request.timeout)?;

        // Use BufReader to read streaming responses line by line
        Ok(Box::new(SseDeltas {
            lines: BufReader::new(resp).lines(),
            timeout: request.timeout,
            done: false,
        }))
    }
}

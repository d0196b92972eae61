pub mod openai;

#[cfg(test)]
pub mod mock;

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config::{LlmConfig, ProviderKind};
use crate::error::{ConfigError, ProviderError};

pub const EXECUTE_FUNCTION: &str = "execute_terminal_command";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// One entry of the conversation as sent to the provider.
///
/// A `Function` message always has `name` set. It also carries the call that
/// produced it (`function_call_name`/`function_call_arguments`) so the
/// requesting assistant turn can be reconstructed on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub function_call_name: Option<String>,
    pub function_call_arguments: Option<String>,
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            function_call_name: None,
            function_call_arguments: None,
            name: None,
        }
    }
}

/// One incremental piece of a streamed response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub function_name: Option<String>,
    pub function_arguments: Option<String>,
}

impl StreamDelta {
    #[cfg(test)]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn function(name: Option<&str>, arguments: Option<&str>) -> Self {
        Self {
            content: None,
            function_name: name.map(str::to_string),
            function_arguments: arguments.map(str::to_string),
        }
    }

    pub fn is_function_call(&self) -> bool {
        self.function_name.is_some() || self.function_arguments.is_some()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FunctionSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// The single capability advertised to the model.
pub fn terminal_function() -> FunctionSchema {
    FunctionSchema {
        name: EXECUTE_FUNCTION,
        description: "Execute a command in the terminal",
        parameters: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute in the terminal",
                },
            },
            "required": ["command"],
        }),
    }
}

pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub functions: &'a [FunctionSchema],
    pub timeout: Duration,
}

/// Lazy, non-restartable sequence of deltas. Exhaustion is the end marker.
pub type DeltaStream = Box<dyn Iterator<Item = Result<StreamDelta, ProviderError>> + Send>;

pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    fn query(&self, request: ChatRequest<'_>) -> Result<Message, ProviderError>;

    fn stream(&self, request: ChatRequest<'_>) -> Result<DeltaStream, ProviderError>;
}

pub fn build_provider(config: &LlmConfig) -> Result<Box<dyn ChatProvider>, ConfigError> {
    let provider: Box<dyn ChatProvider> = match config.provider()? {
        ProviderKind::OpenAi => Box::new(openai::OpenAIClient::from_config(config)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_function_schema() {
        let schema = serde_json::to_value(terminal_function()).unwrap();
        assert_eq!(schema["name"], "execute_terminal_command");
        assert_eq!(schema["description"], "Execute a command in the terminal");
        assert_eq!(schema["parameters"]["required"], json!(["command"]));
        assert_eq!(
            schema["parameters"]["properties"]["command"]["type"],
            "string"
        );
    }

    #[test]
    fn test_delta_kind() {
        assert!(!StreamDelta::content("hi").is_function_call());
        assert!(StreamDelta::function(None, Some("{")).is_function_call());
        assert!(StreamDelta::function(Some("x"), None).is_function_call());
        assert!(!StreamDelta::default().is_function_call());
    }
}

use std::collections::HashMap;

use crate::error::ParseError;
use crate::llm::{EXECUTE_FUNCTION, StreamDelta};

/// Rebuilds one function invocation from fragments spread over a stream.
#[derive(Debug, Default)]
pub struct FunctionCallAccumulator {
    name: Option<String>,
    arguments: String,
    seen: bool,
}

/// A fully received call with its flat string arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub raw_arguments: String,
    pub arguments: HashMap<String, String>,
}

impl FunctionCall {
    /// The shell command requested through `execute_terminal_command`.
    pub fn command(&self) -> Result<&str, ParseError> {
        if self.name != EXECUTE_FUNCTION {
            return Err(ParseError::UnsupportedFunction(self.name.clone()));
        }
        self.arguments
            .get("command")
            .map(String::as_str)
            .filter(|command| !command.trim().is_empty())
            .ok_or(ParseError::MissingCommand)
    }
}

impl FunctionCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &StreamDelta) {
        if !delta.is_function_call() {
            return;
        }
        self.seen = true;
        // Providers send the name once; a repeat overwrites.
        if let Some(name) = delta.function_name.as_deref().filter(|n| !n.is_empty()) {
            self.name = Some(name.to_string());
        }
        if let Some(arguments) = &delta.function_arguments {
            self.arguments.push_str(arguments);
        }
    }

    /// Whether any function-call fragment arrived this turn.
    pub fn is_active(&self) -> bool {
        self.seen
    }

    /// Consume the accumulated fragments once the stream has ended.
    pub fn finish(self) -> Result<FunctionCall, ParseError> {
        let name = self.name.ok_or(ParseError::MissingFunctionName)?;
        let raw = if self.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.arguments
        };
        let arguments: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(ParseError::InvalidArguments)?;
        Ok(FunctionCall {
            name,
            raw_arguments: raw,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulate(deltas: &[StreamDelta]) -> FunctionCallAccumulator {
        let mut acc = FunctionCallAccumulator::new();
        for delta in deltas {
            acc.push(delta);
        }
        acc
    }

    #[test]
    fn test_fragmented_arguments() {
        let acc = accumulate(&[
            StreamDelta::function(Some("execute_terminal_command"), Some("")),
            StreamDelta::function(None, Some(r#"{"comm"#)),
            StreamDelta::function(None, Some(r#"and": "ls -la"#)),
            StreamDelta::function(None, Some(r#""}"#)),
        ]);
        assert!(acc.is_active());
        let call = acc.finish().unwrap();
        assert_eq!(call.command().unwrap(), "ls -la");
        assert_eq!(call.raw_arguments, r#"{"command": "ls -la"}"#);
    }

    #[test]
    fn test_last_name_wins_and_empty_name_ignored() {
        let acc = accumulate(&[
            StreamDelta::function(Some("first"), None),
            StreamDelta::function(Some("execute_terminal_command"), None),
            StreamDelta::function(Some(""), Some(r#"{"command":"pwd"}"#)),
        ]);
        let call = acc.finish().unwrap();
        assert_eq!(call.name, "execute_terminal_command");
        assert_eq!(call.command().unwrap(), "pwd");
    }

    #[test]
    fn test_content_deltas_are_ignored() {
        let acc = accumulate(&[StreamDelta::content("hello")]);
        assert!(!acc.is_active());
        assert!(matches!(acc.finish(), Err(ParseError::MissingFunctionName)));
    }

    #[test]
    fn test_malformed_arguments() {
        let acc = accumulate(&[
            StreamDelta::function(Some("execute_terminal_command"), None),
            StreamDelta::function(None, Some(r#"{"command": "ls"#)),
        ]);
        assert!(matches!(acc.finish(), Err(ParseError::InvalidArguments(_))));
    }

    #[test]
    fn test_non_string_values_rejected() {
        let acc = accumulate(&[StreamDelta::function(
            Some("execute_terminal_command"),
            Some(r#"{"command": ["ls"]}"#),
        )]);
        assert!(matches!(acc.finish(), Err(ParseError::InvalidArguments(_))));
    }

    #[test]
    fn test_command_lookup_errors() {
        let call = accumulate(&[StreamDelta::function(Some("open_browser"), Some("{}"))])
            .finish()
            .unwrap();
        assert!(matches!(
            call.command(),
            Err(ParseError::UnsupportedFunction(name)) if name == "open_browser"
        ));

        let call = accumulate(&[StreamDelta::function(
            Some("execute_terminal_command"),
            Some(r#"{"cmd": "ls"}"#),
        )])
        .finish()
        .unwrap();
        assert!(matches!(call.command(), Err(ParseError::MissingCommand)));
    }
}

use crate::function_call::FunctionCall;
use crate::llm::{Message, Role};
use crate::pty::ExecutionResult;

/// Owns the ordered history sent to the provider. Append-only.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    history: Vec<Message>,
}

impl ConversationSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            history: vec![Message::new(Role::System, system_prompt)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn push_user(&mut self, prompt: impl Into<String>) {
        self.history.push(Message::new(Role::User, prompt));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(Message::new(Role::Assistant, text));
    }

    /// Record a command run; the message also echoes the call that asked for it.
    pub fn push_function_result(&mut self, call: &FunctionCall, result: &ExecutionResult) {
        self.history.push(Message {
            role: Role::Function,
            content: format!(
                "Command executed: {}\nOutput:\n{}",
                result.command,
                result.output_text()
            ),
            function_call_name: Some(call.name.clone()),
            function_call_arguments: Some(call.raw_arguments.clone()),
            name: Some(call.name.clone()),
        });
    }
}

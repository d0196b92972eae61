//! Drives one interaction: prompt, stream, optional command run, and the
//! interpretation stream that follows it.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ProviderError, TurnError};
use crate::function_call::{FunctionCall, FunctionCallAccumulator};
use crate::llm::{ChatProvider, ChatRequest, FunctionSchema, terminal_function};
use crate::pty::{CommandRunner, ExecutionResult};
use crate::render::{EscapeBuffer, FlushThresholds};
use crate::session::ConversationSession;
use crate::sink::TerminalSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnTimeouts {
    pub query: Duration,
    pub stream: Duration,
    pub interpret: Duration,
}

impl Default for TurnTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(30),
            stream: Duration::from_secs(60),
            interpret: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TurnState {
    Idle,
    Streaming,
    ContentTurn,
    FunctionCallTurn,
    Executing,
    Interpreting,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::Streaming => "streaming",
            TurnState::ContentTurn => "content",
            TurnState::FunctionCallTurn => "function-call",
            TurnState::Executing => "executing",
            TurnState::Interpreting => "interpreting",
        };
        f.write_str(name)
    }
}

/// How a streaming turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    Reply(String),
    Executed {
        result: ExecutionResult,
        interpretation: String,
    },
}

/// What one consumed stream produced.
struct StreamEnd {
    text: String,
    call: Option<FunctionCallAccumulator>,
}

pub struct Orchestrator {
    provider: Box<dyn ChatProvider>,
    session: ConversationSession,
    runner: CommandRunner,
    sink: TerminalSink,
    timeouts: TurnTimeouts,
    functions: Vec<FunctionSchema>,
    state: TurnState,
}

impl Orchestrator {
    pub fn new(
        provider: Box<dyn ChatProvider>,
        session: ConversationSession,
        runner: CommandRunner,
        sink: TerminalSink,
        timeouts: TurnTimeouts,
    ) -> Self {
        Self {
            provider,
            session,
            runner,
            sink,
            timeouts,
            functions: vec![terminal_function()],
            state: TurnState::Idle,
        }
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Single non-streaming exchange without function calling.
    pub fn ask(&mut self, prompt: &str) -> Result<String, TurnError> {
        self.session.push_user(prompt);
        let request = ChatRequest {
            messages: self.session.messages(),
            functions: &[],
            timeout: self.timeouts.query,
        };
        let reply = self.provider.query(request)?;
        self.session.push_assistant(reply.content.clone());
        Ok(reply.content)
    }

    /// Full streaming interaction for one user prompt.
    pub fn stream_turn(&mut self, prompt: &str) -> Result<TurnOutcome, TurnError> {
        let result = self.run_turn(prompt);
        self.sink.flush();
        self.transition(TurnState::Idle);
        result
    }

    fn run_turn(&mut self, prompt: &str) -> Result<TurnOutcome, TurnError> {
        self.session.push_user(prompt);
        self.transition(TurnState::Streaming);

        let end = self.consume_stream(
            true,
            self.timeouts.stream,
            FlushThresholds::INTERACTIVE,
        )?;

        let Some(accumulator) = end.call else {
            self.transition(TurnState::ContentTurn);
            self.session.push_assistant(end.text.clone());
            return Ok(TurnOutcome::Reply(end.text));
        };

        self.transition(TurnState::FunctionCallTurn);
        let call = accumulator.finish()?;
        let command = call.command()?.to_string();
        if !end.text.is_empty() {
            self.session.push_assistant(end.text);
        }

        let result = self.execute(&call, &command);

        self.transition(TurnState::Interpreting);
        self.sink.write_str("\n");
        let end = self.consume_stream(
            false,
            self.timeouts.interpret,
            FlushThresholds::INTERPRETATION,
        )?;
        if end.call.is_some() {
            warn!("ignoring function call requested during interpretation");
        }
        self.session.push_assistant(end.text.clone());

        Ok(TurnOutcome::Executed {
            result,
            interpretation: end.text,
        })
    }

    fn execute(&mut self, call: &FunctionCall, command: &str) -> ExecutionResult {
        self.transition(TurnState::Executing);
        self.sink.write_str(&format!(
            "\n\x1b[33mExecuting command:\x1b[0m \x1b[32m{command}\x1b[0m\n"
        ));
        let result = self.runner.run(command);
        self.session.push_function_result(call, &result);
        result
    }

    /// Read one stream to its end. Nothing is committed to history here.
    fn consume_stream(
        &self,
        with_functions: bool,
        timeout: Duration,
        thresholds: FlushThresholds,
    ) -> Result<StreamEnd, ProviderError> {
        let functions: &[FunctionSchema] = if with_functions { &self.functions } else { &[] };
        let request = ChatRequest {
            messages: self.session.messages(),
            functions,
            timeout,
        };
        let started = Instant::now();
        let stream = self.provider.stream(request)?;

        let mut render = EscapeBuffer::new(thresholds);
        let mut text = String::new();
        let mut call = FunctionCallAccumulator::new();

        for delta in stream {
            if started.elapsed() > timeout {
                return Err(ProviderError::Timeout(timeout));
            }
            let delta = delta?;
            if delta.is_function_call() {
                call.push(&delta);
                continue;
            }
            if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
                text.push_str(content);
                if let Some(out) = render.append(content) {
                    self.sink.write_str(&out);
                }
            }
        }
        if started.elapsed() > timeout {
            return Err(ProviderError::Timeout(timeout));
        }
        if let Some(out) = render.flush() {
            self.sink.write_str(&out);
        }

        debug!(
            chars = text.len(),
            function_call = call.is_active(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stream finished"
        );
        Ok(StreamEnd {
            text,
            call: call.is_active().then_some(call),
        })
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "turn state");
            self.state = next;
        }
    }
}

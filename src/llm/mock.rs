//! Scripted provider used by the orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{ChatProvider, ChatRequest, DeltaStream, Message, Role, StreamDelta};
use crate::error::ProviderError;

#[derive(Clone, Debug)]
pub enum Step {
    Delta(StreamDelta),
    Sleep(Duration),
    Fail,
}

/// What the provider saw on each call.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub messages: Vec<Message>,
    pub function_count: usize,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct ScriptedProvider {
    streams: Mutex<VecDeque<Vec<Step>>>,
    replies: Mutex<VecDeque<Result<String, ()>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, steps: Vec<Step>) -> Self {
        self.streams.lock().unwrap().push_back(steps);
        self
    }

    pub fn with_reply(self, reply: Result<&str, ()>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string));
        self
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<SeenRequest>>> {
        Arc::clone(&self.seen)
    }

    fn record(&self, request: &ChatRequest<'_>) {
        self.seen.lock().unwrap().push(SeenRequest {
            messages: request.messages.to_vec(),
            function_count: request.functions.len(),
            timeout: request.timeout,
        });
    }
}

pub fn content(text: &str) -> Step {
    Step::Delta(StreamDelta::content(text))
}

pub fn call_name(name: &str) -> Step {
    Step::Delta(StreamDelta::function(Some(name), None))
}

pub fn call_args(arguments: &str) -> Step {
    Step::Delta(StreamDelta::function(None, Some(arguments)))
}

impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn query(&self, request: ChatRequest<'_>) -> Result<Message, ProviderError> {
        self.record(&request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        reply
            .map(|text| Message::new(Role::Assistant, text))
            .map_err(|()| ProviderError::Timeout(request.timeout))
    }

    fn stream(&self, request: ChatRequest<'_>) -> Result<DeltaStream, ProviderError> {
        self.record(&request);
        let steps = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted stream left");
        let timeout = request.timeout;

        let mut steps = steps.into_iter();
        let iter = std::iter::from_fn(move || {
            loop {
                match steps.next()? {
                    Step::Delta(delta) => return Some(Ok(delta)),
                    Step::Sleep(pause) => thread::sleep(pause),
                    Step::Fail => return Some(Err(ProviderError::Timeout(timeout))),
                }
            }
        });
        Ok(Box::new(iter))
    }
}

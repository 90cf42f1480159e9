//! Shared test helpers: a scripted model client and recording tools.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use workbench_core::error::{ProviderError, ToolError};
use workbench_core::message::ContentBlock;
use workbench_core::provider::{
    ModelClient, ModelReply, ModelRequest, ModelResponse, StopReason, StreamDelta, Usage,
};
use workbench_core::tool::{Tool, ToolContext};

/// How a scripted stream ends.
#[derive(Clone)]
enum StreamEnd {
    Complete,
    /// Content deltas only, then the channel closes.
    Truncated,
    /// Content deltas only, then this error.
    Failed(ProviderError),
}

/// A client that answers each call with the next scripted response.
///
/// Panics if more calls are made than responses provided (unless built with
/// [`repeating`](Self::repeating)).
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<ModelResponse, ProviderError>>>,
    repeat: Option<ModelResponse>,
    streaming: bool,
    stall: bool,
    stream_end: StreamEnd,
    cancel_on_call: Option<(usize, CancellationToken)>,
    requests: Mutex<Vec<ModelRequest>>,
    held: Mutex<Vec<mpsc::Sender<Result<StreamDelta, ProviderError>>>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<ModelResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            streaming: false,
            stall: false,
            stream_end: StreamEnd::Complete,
            cancel_on_call: None,
            requests: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response.
    pub fn repeating(response: ModelResponse) -> Self {
        let mut client = Self::new(vec![]);
        client.repeat = Some(response);
        client
    }

    /// Answer `send` with delta streams instead of finished messages.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Streams never deliver `message_stop` and stay open.
    pub fn stalling(mut self) -> Self {
        self.streaming = true;
        self.stall = true;
        self
    }

    /// Streams deliver their content deltas, then close without `message_stop`.
    pub fn truncating(mut self) -> Self {
        self.streaming = true;
        self.stream_end = StreamEnd::Truncated;
        self
    }

    /// Streams deliver their content deltas, then fail with `error`.
    pub fn failing_mid_stream(mut self, error: ProviderError) -> Self {
        self.streaming = true;
        self.stream_end = StreamEnd::Failed(error);
        self
    }

    /// Cancel `token` while answering call number `call` (1-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some((n, token)) = &self.cancel_on_call
            && *n == call
        {
            token.cancel();
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => match &self.repeat {
                Some(response) => Ok(response.clone()),
                None => panic!("ScriptedClient: no more responses (call #{call})"),
            },
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.next(request)
    }

    async fn send(&self, request: ModelRequest) -> Result<ModelReply, ProviderError> {
        let response = self.next(request)?;
        if !self.streaming {
            return Ok(ModelReply::Message(response));
        }
        let mut deltas = response.into_deltas();
        if self.stall {
            deltas.retain(|d| !matches!(d, StreamDelta::MessageStop));
        }
        let mut items: Vec<Result<StreamDelta, ProviderError>> = match &self.stream_end {
            StreamEnd::Complete => deltas.into_iter().map(Ok).collect(),
            StreamEnd::Truncated | StreamEnd::Failed(_) => deltas
                .into_iter()
                .filter(|d| {
                    !matches!(
                        d,
                        StreamDelta::BlockStop { .. }
                            | StreamDelta::MessageDelta { .. }
                            | StreamDelta::MessageStop
                    )
                })
                .map(Ok)
                .collect(),
        };
        if let StreamEnd::Failed(error) = &self.stream_end {
            items.push(Err(error.clone()));
        }
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).expect("channel sized for all deltas");
        }
        if self.stall {
            self.held.lock().unwrap().push(tx);
        }
        Ok(ModelReply::Stream(rx))
    }
}

pub fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 5,
    }
}

/// A final answer with no tool calls.
pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        usage: Some(usage()),
        model: "scripted".into(),
    }
}

/// A response made of the given tool calls, `(id, name, input)`.
pub fn tool_use_response(calls: Vec<(&str, &str, serde_json::Value)>) -> ModelResponse {
    ModelResponse {
        content: calls
            .into_iter()
            .map(|(id, name, input)| ContentBlock::tool_use(id, name, input))
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: Some(usage()),
        model: "scripted".into(),
    }
}

/// A single `Task` call.
pub fn task_call(id: &str, agent: &str, prompt: &str) -> ModelResponse {
    tool_use_response(vec![(
        id,
        "Task",
        serde_json::json!({"subagentType": agent, "prompt": prompt}),
    )])
}

/// Echoes `msg` and records every input it was called with.
#[derive(Clone, Default)]
pub struct EchoTool {
    calls: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl EchoTool {
    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "Echo"
    }

    fn description(&self) -> &str {
        "Echo back msg"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"msg": {"type": "string"}},
            "required": ["msg"]
        })
    }

    async fn run(&self, input: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(input.clone());
        Ok(input["msg"].as_str().unwrap_or_default().to_string())
    }
}

/// Always fails.
pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn run(&self, _input: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "disk on fire".into(),
        })
    }
}

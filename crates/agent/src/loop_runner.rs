//! The turn loop.
//!
//! ```text
//! AwaitingResponse ──no tool_use──▶ Done
//!        ▲                │
//!        │            tool_use
//!        │                ▼
//!        └──────── DispatchingTools
//! ```
//!
//! Any state can move to `Aborted` on a model client error, the turn
//! ceiling, or cancellation. Tool failures never abort; they become
//! `is_error` results the model sees on the next turn.

use thiserror::Error;
use tracing::{debug, info, warn};
use workbench_core::agent::AgentDefinition;
use workbench_core::error::{AssemblyError, ProviderError};
use workbench_core::message::{Message, Thread};
use workbench_core::provider::{ModelReply, ModelRequest, ModelResponse, StreamDelta, Usage};
use workbench_core::tool::ToolResult;

use crate::assembler::RequestAssembler;
use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::stream::DeltaAccumulator;
use crate::stream_event::AgentStreamEvent;

/// Why a loop aborted.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    #[error("model client error: {0}")]
    ModelClient(#[from] ProviderError),

    #[error("turn limit exceeded ({max_turns} turns)")]
    TurnLimitExceeded { max_turns: u32 },

    #[error("execution cancelled")]
    Cancelled,

    #[error("request assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

impl LoopError {
    /// Short machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelClient(e) => e.kind(),
            Self::TurnLimitExceeded { .. } => "turn_limit",
            Self::Cancelled => "cancelled",
            Self::Assembly(_) => "assembly",
        }
    }
}

/// An aborted loop, with the thread as it stood when it stopped.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct LoopFailure {
    #[source]
    pub error: LoopError,
    pub thread: Thread,
    pub turns: u32,
}

impl LoopFailure {
    /// The most recent assistant text, useful for showing partial work.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.thread.last_assistant_text()
    }
}

/// A loop that reached its final answer.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Concatenated text of the final assistant message
    pub text: String,
    pub thread: Thread,
    /// Model calls made
    pub turns: u32,
    /// Usage summed over this loop's own calls
    pub usage: Usage,
}

/// Drives one thread to completion against the model client.
///
/// Each loop owns its thread and turn counter; nested agents run their own
/// `TurnLoop` under a child context.
pub struct TurnLoop<'a> {
    ctx: &'a ExecutionContext,
    template: ModelRequest,
    thread: Thread,
    turn_count: u32,
    usage: Usage,
}

impl<'a> TurnLoop<'a> {
    /// `template` carries model, system and tools; its messages are ignored
    /// and replaced by the thread on every turn.
    pub fn new(ctx: &'a ExecutionContext, template: ModelRequest, thread: Thread) -> Self {
        Self {
            ctx,
            template,
            thread,
            turn_count: 0,
            usage: Usage::default(),
        }
    }

    pub async fn run(mut self) -> Result<LoopOutcome, LoopFailure> {
        let depth = self.ctx.depth;
        info!(
            depth,
            thread = %self.thread.id,
            model = %self.template.model,
            tools = self.template.tools.len(),
            messages = self.thread.len(),
            "Turn loop started"
        );

        loop {
            if self.ctx.cancel.is_cancelled() {
                return Err(self.abort(LoopError::Cancelled));
            }
            self.turn_count += 1;
            if self.turn_count > self.ctx.max_turns {
                let max_turns = self.ctx.max_turns;
                return Err(self.abort(LoopError::TurnLimitExceeded { max_turns }));
            }

            debug!(depth, turn = self.turn_count, "Calling model");
            self.ctx.emit(AgentStreamEvent::TurnStarted {
                depth,
                turn: self.turn_count,
            });

            let response = match self.call_model().await {
                Ok(response) => response,
                Err(e) => return Err(self.abort(e)),
            };
            if let Some(usage) = response.usage {
                self.usage.add(usage);
            }

            let message = Message::assistant(response.content);
            let calls: Vec<(String, String, serde_json::Value)> = message
                .tool_uses()
                .into_iter()
                .map(|t| (t.id.to_string(), t.name.to_string(), t.input.clone()))
                .collect();
            let text = message.text();
            self.thread.push(message);

            if calls.is_empty() {
                info!(depth, turns = self.turn_count, "Turn loop done");
                self.ctx.emit(AgentStreamEvent::Done {
                    depth,
                    turns: self.turn_count,
                    usage: self.usage,
                });
                return Ok(LoopOutcome {
                    text,
                    thread: self.thread,
                    turns: self.turn_count,
                    usage: self.usage,
                });
            }

            debug!(depth, turn = self.turn_count, calls = calls.len(), "Dispatching tool calls");
            let results = match self.dispatch_all(&calls).await {
                Ok(results) => results,
                Err(e) => return Err(self.abort(e)),
            };
            self.thread.push(Message::tool_results(results));
        }
    }

    /// Run every call in order, one result per call.
    async fn dispatch_all(
        &self,
        calls: &[(String, String, serde_json::Value)],
    ) -> Result<Vec<ToolResult>, LoopError> {
        let depth = self.ctx.depth;
        let dispatcher = Dispatcher::new(self.ctx, &self.template.tools);
        let mut results = Vec::with_capacity(calls.len());
        for (id, name, input) in calls {
            self.ctx.emit(AgentStreamEvent::ToolCall {
                depth,
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            });
            let result = dispatcher.invoke(id, name, input).await?;
            self.ctx.emit(AgentStreamEvent::ToolResult {
                depth,
                id: id.clone(),
                name: name.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            });
            results.push(result);
        }
        Ok(results)
    }

    /// Make one model call and reduce whatever comes back to a full response.
    async fn call_model(&self) -> Result<ModelResponse, LoopError> {
        let mut request = self.template.clone();
        request.messages = self.thread.messages.clone();

        let cancel = &self.ctx.cancel;
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled),
            reply = self.ctx.client.send(request) => reply?,
        };

        match reply {
            ModelReply::Message(response) => {
                let text = Message::assistant(response.content.clone()).text();
                if !text.is_empty() {
                    self.ctx.emit(AgentStreamEvent::Chunk {
                        depth: self.ctx.depth,
                        content: text,
                    });
                }
                Ok(response)
            }
            ModelReply::Stream(mut rx) => {
                let mut acc = DeltaAccumulator::new();
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(LoopError::Cancelled),
                        next = rx.recv() => next,
                    };
                    let Some(delta) = next else { break };
                    let delta = delta?;
                    if let StreamDelta::TextDelta { text, .. } = &delta {
                        self.ctx.emit(AgentStreamEvent::Chunk {
                            depth: self.ctx.depth,
                            content: text.clone(),
                        });
                    }
                    if acc.push(delta)? {
                        break;
                    }
                }
                Ok(acc.finish()?)
            }
        }
    }

    fn abort(self, error: LoopError) -> LoopFailure {
        match &error {
            LoopError::Cancelled => {
                info!(depth = self.ctx.depth, turns = self.turn_count, "Turn loop cancelled")
            }
            e => warn!(depth = self.ctx.depth, turns = self.turn_count, error = %e, "Turn loop aborted"),
        }
        self.ctx.emit(AgentStreamEvent::Error {
            depth: self.ctx.depth,
            message: error.to_string(),
        });
        LoopFailure {
            error,
            thread: self.thread,
            turns: self.turn_count.min(self.ctx.max_turns),
        }
    }
}

/// Run a session to completion at the top level.
///
/// With `agent`, the session's messages run under that agent's model,
/// system prompt and tools instead of the session's own.
pub async fn run_session(
    ctx: &ExecutionContext,
    agent: Option<&AgentDefinition>,
) -> Result<LoopOutcome, LoopFailure> {
    let thread = Thread::new(ctx.session.messages.clone());
    let template = match RequestAssembler::new(ctx).assemble(agent, Vec::new()) {
        Ok(template) => template,
        Err(e) => {
            warn!(error = %e, "Request assembly failed");
            return Err(LoopFailure {
                error: LoopError::Assembly(e),
                thread,
                turns: 0,
            });
        }
    };
    TurnLoop::new(ctx, template, thread).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use workbench_core::message::{ContentBlock, Role};
    use workbench_core::session::Session;
    use workbench_core::tool::{Tool, ToolRegistry, ToolSchema};

    use crate::registry::AgentRegistry;
    use crate::test_helpers::{
        EchoTool, FailingTool, ScriptedClient, task_call, text_response, tool_use_response,
    };

    fn echo_schema() -> ToolSchema {
        EchoTool::default().describe()
    }

    fn ctx(session: Session, client: Arc<ScriptedClient>, echo: EchoTool) -> ExecutionContext {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(echo));
        tools.register(Box::new(FailingTool));
        ExecutionContext::new(Arc::new(session), client).with_tools(Arc::new(tools))
    }

    fn hi() -> Session {
        Session::new("claude-root", 512).with_message(Message::user("hi"))
    }

    fn agents(defs: Vec<AgentDefinition>) -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        for def in defs {
            registry.register(def).unwrap();
        }
        Arc::new(registry)
    }

    fn tool_results(message: &Message) -> Vec<(String, String, bool)> {
        message
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some((tool_use_id.clone(), content.clone(), *is_error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn plain_answer_takes_one_call() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(text_response("hello"))]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default());

        let outcome = run_session(&ctx, None).await.unwrap();
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.thread.len(), 2);
        assert_eq!(outcome.turns, 1);
        assert_eq!(client.call_count(), 1);
        assert!(client.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_use_response(vec![("toolu_1", "Echo", serde_json::json!({"msg": "x"}))])),
            Ok(text_response("echoed x")),
        ]));
        let echo = EchoTool::default();
        let session = hi().with_tool(echo_schema());
        let ctx = ctx(session, client.clone(), echo.clone());

        let outcome = run_session(&ctx, None).await.unwrap();
        let messages = &outcome.thread.messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(tool_results(&messages[2]), vec![("toolu_1".into(), "x".into(), false)]);
        assert_eq!(echo.calls(), vec![serde_json::json!({"msg": "x"})]);
        assert_eq!(outcome.text, "echoed x");

        // The second request carries the whole thread so far.
        assert_eq!(client.requests()[1].messages, messages[..3].to_vec());
    }

    #[tokio::test]
    async fn unregistered_agent_is_reported_and_loop_completes() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_use_response(vec![(
                "toolu_1",
                "Task",
                serde_json::json!({"subagentType": "reviewer", "prompt": "review"}),
            )])),
            Ok(text_response("no reviewer, done anyway")),
        ]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default());

        let outcome = run_session(&ctx, None).await.unwrap();
        let results = tool_results(&outcome.thread.messages[2]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "toolu_1");
        assert!(results[0].2);
        assert_eq!(outcome.text, "no reviewer, done anyway");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn results_match_calls_in_order() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_use_response(vec![
                ("toolu_a", "Echo", serde_json::json!({"msg": "one"})),
                ("toolu_b", "ghost", serde_json::json!({})),
                ("toolu_c", "fail", serde_json::json!({})),
                ("toolu_d", "Echo", serde_json::json!({"msg": "four"})),
            ])),
            Ok(text_response("done")),
        ]));
        let session = hi()
            .with_tool(echo_schema())
            .with_tool(FailingTool.describe())
            .with_tool(ToolSchema {
                name: "ghost".into(),
                description: "declared but never registered".into(),
                input_schema: serde_json::json!({}),
            });
        let ctx = ctx(session, client, EchoTool::default());

        let outcome = run_session(&ctx, None).await.unwrap();
        let results = tool_results(&outcome.thread.messages[2]);
        let ids: Vec<&str> = results.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(ids, vec!["toolu_a", "toolu_b", "toolu_c", "toolu_d"]);
        assert_eq!(results[0].1, "one");
        assert_eq!(results[1], ("toolu_b".into(), "tool not found".into(), true));
        assert!(results[2].2);
        assert_eq!(results[3].1, "four");
        assert!(outcome.thread.validate().is_ok());
    }

    #[tokio::test]
    async fn turn_limit_after_exactly_max_turns_calls() {
        let client = Arc::new(ScriptedClient::repeating(tool_use_response(vec![(
            "toolu_1",
            "Echo",
            serde_json::json!({"msg": "again"}),
        )])));
        let ctx = ctx(hi().with_tool(echo_schema()), client.clone(), EchoTool::default())
            .with_max_turns(3);

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(failure.error, LoopError::TurnLimitExceeded { max_turns: 3 }));
        assert_eq!(failure.error.kind(), "turn_limit");
        assert_eq!(client.call_count(), 3);
        assert_eq!(failure.turns, 3);
        // user + 3 × (assistant, results)
        assert_eq!(failure.thread.len(), 7);
    }

    #[tokio::test]
    async fn client_error_aborts_with_partial_thread() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(ModelResponse {
                content: vec![
                    ContentBlock::text("Reading first."),
                    ContentBlock::tool_use("toolu_1", "Echo", serde_json::json!({"msg": "x"})),
                ],
                ..tool_use_response(vec![])
            }),
            Err(ProviderError::AuthenticationFailed("bad key".into())),
        ]));
        let ctx = ctx(hi().with_tool(echo_schema()), client, EchoTool::default());

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(failure.error, LoopError::ModelClient(ProviderError::AuthenticationFailed(_))));
        assert_eq!(failure.error.kind(), "auth");
        assert_eq!(failure.thread.len(), 3);
        assert_eq!(failure.last_assistant_text().as_deref(), Some("Reading first."));
    }

    #[tokio::test]
    async fn sub_agent_answer_becomes_tool_result() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(task_call("toolu_1", "reviewer", "review the diff")),
            Ok(text_response("LGTM")),
            Ok(text_response("Reviewer says LGTM")),
        ]));
        let reviewer = AgentDefinition::new("reviewer", "Reviews diffs")
            .with_system_prompt("You review code.")
            .with_tools(["Echo"]);
        let ctx = ctx(hi().with_tool(echo_schema()), client.clone(), EchoTool::default())
            .with_agents(agents(vec![reviewer]));

        let outcome = run_session(&ctx, None).await.unwrap();
        assert_eq!(
            tool_results(&outcome.thread.messages[2]),
            vec![("toolu_1".into(), "LGTM".into(), false)]
        );
        assert_eq!(outcome.text, "Reviewer says LGTM");

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        // Root advertises Task; the nested request is isolated and never does.
        assert!(requests[0].tools.iter().any(|t| t.name == "Task"));
        assert_eq!(requests[1].messages, vec![Message::user("review the diff")]);
        assert_eq!(requests[1].tools, vec![echo_schema()]);
        assert_eq!(requests[1].system[0].text, "You review code.");
    }

    #[tokio::test]
    async fn nested_transport_error_is_isolated() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(task_call("toolu_1", "reviewer", "p")),
            Err(ProviderError::Network("connection reset".into())),
            Ok(text_response("carried on")),
        ]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default())
            .with_agents(agents(vec![AgentDefinition::new("reviewer", "r")]));

        let outcome = run_session(&ctx, None).await.unwrap();
        let results = tool_results(&outcome.thread.messages[2]);
        assert_eq!(results.len(), 1);
        assert!(results[0].2);
        assert_eq!(outcome.text, "carried on");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn spawn_at_depth_ceiling_makes_no_nested_call() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(task_call("toolu_1", "reviewer", "p")),
            Ok(text_response("fine")),
        ]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default())
            .with_agents(agents(vec![AgentDefinition::new("reviewer", "r")]))
            .with_max_depth(0);

        let outcome = run_session(&ctx, None).await.unwrap();
        let results = tool_results(&outcome.thread.messages[2]);
        assert!(results[0].2);
        assert!(results[0].1.contains("depth ceiling"));
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn nested_agents_recurse_until_the_ceiling() {
        // root → planner → reviewer → (refused: ceiling 2)
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(task_call("toolu_root", "planner", "plan")),
            Ok(task_call("toolu_planner", "reviewer", "review")),
            Ok(task_call("toolu_reviewer", "planner", "too deep")),
            Ok(text_response("reviewed")),
            Ok(text_response("planned")),
            Ok(text_response("all done")),
        ]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default())
            .with_agents(agents(vec![
                AgentDefinition::new("planner", "p"),
                AgentDefinition::new("reviewer", "r"),
            ]))
            .with_max_depth(2);

        let outcome = run_session(&ctx, None).await.unwrap();
        assert_eq!(outcome.text, "all done");
        assert_eq!(
            tool_results(&outcome.thread.messages[2]),
            vec![("toolu_root".into(), "planned".into(), false)]
        );

        let requests = client.requests();
        assert_eq!(requests.len(), 6);
        // The reviewer (depth 2) saw its refused Task call as an error result.
        let reviewer_followup = &requests[3].messages;
        let refused = tool_results(&reviewer_followup[2]);
        assert_eq!(refused[0].0, "toolu_reviewer");
        assert!(refused[0].2);
    }

    #[tokio::test]
    async fn sub_agent_cannot_call_tools_outside_its_list() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(task_call("toolu_1", "reader", "go")),
            Ok(tool_use_response(vec![("toolu_2", "fail", serde_json::json!({}))])),
            Ok(text_response("could not")),
            Ok(text_response("ok")),
        ]));
        let session = hi().with_tool(echo_schema()).with_tool(FailingTool.describe());
        let ctx = ctx(session, client.clone(), EchoTool::default())
            .with_agents(agents(vec![AgentDefinition::new("reader", "r").with_tools(["Echo"])]));

        run_session(&ctx, None).await.unwrap();
        let nested_followup = &client.requests()[2].messages;
        assert_eq!(
            tool_results(&nested_followup[2]),
            vec![("toolu_2".into(), "tool not found".into(), true)]
        );
    }

    #[tokio::test]
    async fn streaming_matches_message_form() {
        let script = || {
            vec![
                Ok(tool_use_response(vec![("toolu_1", "Echo", serde_json::json!({"msg": "x"}))])),
                Ok(text_response("echoed x")),
            ]
        };
        let session = hi().with_tool(echo_schema());

        let buffered = Arc::new(ScriptedClient::new(script()));
        let expected = run_session(&ctx(session.clone(), buffered, EchoTool::default()), None)
            .await
            .unwrap();

        let streamed = Arc::new(ScriptedClient::new(script()).streaming());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx(session, streamed, EchoTool::default()).with_observer(tx);
        let outcome = run_session(&ctx, None).await.unwrap();

        assert_eq!(outcome.thread.messages, expected.thread.messages);
        assert_eq!(outcome.text, "echoed x");

        let mut chunks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentStreamEvent::Chunk { content, .. } = event {
                chunks.push(content);
            }
        }
        assert_eq!(chunks, vec!["echoed x"]);
    }

    #[tokio::test]
    async fn observer_sees_the_run() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_use_response(vec![("toolu_1", "Echo", serde_json::json!({"msg": "x"}))])),
            Ok(text_response("done")),
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx(hi().with_tool(echo_schema()), client, EchoTool::default()).with_observer(tx);
        run_session(&ctx, None).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec!["turn_started", "tool_call", "tool_result", "turn_started", "chunk", "done"]
        );
    }

    #[tokio::test]
    async fn usage_is_summed() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(tool_use_response(vec![("toolu_1", "Echo", serde_json::json!({"msg": "x"}))])),
            Ok(text_response("done")),
        ]));
        let ctx = ctx(hi().with_tool(echo_schema()), client, EchoTool::default());
        let outcome = run_session(&ctx, None).await.unwrap();
        assert_eq!(outcome.usage.input_tokens, 20);
        assert_eq!(outcome.usage.output_tokens, 10);
    }

    #[tokio::test]
    async fn cancelled_before_first_turn() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let token = CancellationToken::new();
        let ctx = ctx(hi(), client.clone(), EchoTool::default()).with_cancellation(token.clone());
        token.cancel();

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(failure.error, LoopError::Cancelled));
        assert_eq!(client.call_count(), 0);
        assert_eq!(failure.thread.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_mid_stream() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(text_response("partial"))]).stalling());
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx(hi(), client, EchoTool::default())
            .with_cancellation(token.clone())
            .with_observer(tx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let failure = run_session(&ctx, None).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(failure.error, LoopError::Cancelled));
        // Nothing half-streamed lands in the thread.
        assert_eq!(failure.thread.len(), 1);
        let mut saw_chunk = false;
        while let Ok(event) = rx.try_recv() {
            saw_chunk |= matches!(event, AgentStreamEvent::Chunk { ref content, .. } if content == "partial");
        }
        assert!(saw_chunk);
    }

    #[tokio::test]
    async fn provider_error_mid_stream_aborts_without_half_message() {
        let client = Arc::new(
            ScriptedClient::new(vec![Ok(text_response("half an ans"))]).failing_mid_stream(
                ProviderError::StreamInterrupted("connection reset".into()),
            ),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx(hi(), client.clone(), EchoTool::default()).with_observer(tx);

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(
            failure.error,
            LoopError::ModelClient(ProviderError::StreamInterrupted(_))
        ));
        assert_eq!(failure.error.kind(), "transport");
        assert_eq!(failure.thread.len(), 1);
        assert_eq!(failure.turns, 1);
        assert_eq!(client.call_count(), 1);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        // The partial text was still forwarded, and the abort was reported last.
        assert!(events.iter().any(
            |e| matches!(e, AgentStreamEvent::Chunk { content, .. } if content == "half an ans")
        ));
        assert_eq!(events.last().map(|e| e.event_type()), Some("error"));
    }

    #[tokio::test]
    async fn stream_closed_before_message_stop_aborts() {
        let client = Arc::new(
            ScriptedClient::new(vec![Ok(tool_use_response(vec![(
                "toolu_1",
                "Echo",
                serde_json::json!({"msg": "x"}),
            )]))])
            .truncating(),
        );
        let echo = EchoTool::default();
        let ctx = ctx(hi().with_tool(echo_schema()), client, echo.clone());

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(
            failure.error,
            LoopError::ModelClient(ProviderError::StreamInterrupted(_))
        ));
        assert_eq!(failure.error.kind(), "transport");
        assert_eq!(failure.thread.len(), 1);
        assert_eq!(failure.thread.messages[0].role, Role::User);
        // The half-received tool call was never dispatched.
        assert!(echo.calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_inside_nested_agent_aborts_parent() {
        let token = CancellationToken::new();
        let client = Arc::new(
            ScriptedClient::new(vec![
                Ok(task_call("toolu_1", "reviewer", "p")),
                Ok(text_response("never seen")),
            ])
            .streaming()
            .cancel_on_call(2, token.clone()),
        );
        let ctx = ctx(hi(), client.clone(), EchoTool::default())
            .with_agents(agents(vec![AgentDefinition::new("reviewer", "r")]))
            .with_cancellation(token);

        let failure = run_session(&ctx, None).await.unwrap_err();
        assert!(matches!(failure.error, LoopError::Cancelled));
        assert_eq!(client.call_count(), 2);
        // The parent's pending Task call never got a result.
        assert_eq!(failure.thread.len(), 2);
    }

    #[tokio::test]
    async fn agent_override_at_top_level() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(text_response("as reviewer"))]));
        let ctx = ctx(hi().with_system("session system"), client.clone(), EchoTool::default());
        let reviewer = AgentDefinition::new("reviewer", "r").with_system_prompt("You review.");

        let outcome = run_session(&ctx, Some(&reviewer)).await.unwrap();
        assert_eq!(outcome.text, "as reviewer");
        let request = &client.requests()[0];
        assert_eq!(request.model, "claude-root");
        assert_eq!(request.system.len(), 1);
        assert_eq!(request.system[0].text, "You review.");
    }

    #[tokio::test]
    async fn assembly_failure_at_top_level() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let ctx = ctx(hi(), client.clone(), EchoTool::default());
        let agent = AgentDefinition::new("reviewer", "r").with_tools(["web_search"]);

        let failure = run_session(&ctx, Some(&agent)).await.unwrap_err();
        assert!(matches!(
            failure.error,
            LoopError::Assembly(AssemblyError::UnknownTool(ref name)) if name == "web_search"
        ));
        assert_eq!(client.call_count(), 0);
        assert_eq!(failure.thread.len(), 1);
    }
}

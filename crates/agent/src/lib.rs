//! The agent execution engine.
//!
//! A request runs as a **turn loop**:
//!
//! 1. **Assemble** the wire request (model, system blocks, tools, thread)
//! 2. **Call** the model client, reducing a delta stream to a full message
//! 3. **If tool calls**: dispatch each in order, append the results, loop
//! 4. **If text only**: done, the text is the answer
//!
//! The synthetic `Task` tool spawns a named agent as a nested turn loop with
//! its own thread. The parent waits for it, and its final text becomes the
//! parent's tool result. Nesting is bounded by `max_depth`, each loop by
//! `max_turns`.

pub mod assembler;
pub mod context;
pub mod dispatch;
pub mod loop_runner;
pub mod registry;
pub mod spawner;
pub mod stream;
pub mod stream_event;
pub mod task;

#[cfg(test)]
mod test_helpers;

pub use assembler::RequestAssembler;
pub use context::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_TURNS, ExecutionContext};
pub use dispatch::{Dispatch, Dispatcher};
pub use loop_runner::{LoopError, LoopFailure, LoopOutcome, TurnLoop, run_session};
pub use registry::{AgentRegistry, SkillRegistry};
pub use stream::DeltaAccumulator;
pub use stream_event::AgentStreamEvent;
pub use task::{TaskInput, task_schema};

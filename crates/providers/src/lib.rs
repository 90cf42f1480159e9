//! Model client implementations for Workbench.
//!
//! All clients implement the `workbench_core::ModelClient` trait.
//! `RetryingClient` wraps any of them with a retry policy; the engine
//! itself never retries.

pub mod anthropic;
pub mod retry;

pub use anthropic::AnthropicClient;
pub use retry::RetryingClient;

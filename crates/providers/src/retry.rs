//! Retrying client: bounded retries with exponential backoff.
//!
//! The turn loop never retries; a client that wants to survive transient
//! failures (rate limits, dropped connections, 5xx) wraps itself in this.
//! Only the opening of a call is retried: once a stream has started
//! delivering deltas, a mid-stream failure is surfaced as-is.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use workbench_core::error::ProviderError;
use workbench_core::provider::{ModelClient, ModelReply, ModelRequest, ModelResponse};

/// A client that retries transient failures of an inner client.
pub struct RetryingClient {
    name: String,
    inner: Arc<dyn ModelClient>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryingClient {
    /// Wrap a client with the default policy (2 retries, 500ms initial backoff).
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        Self {
            name: format!("retrying({})", inner.name()),
            inner,
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Backoff before retry number `attempt` (1-based); doubles each time.
    /// A rate-limit hint from the server wins when it is longer.
    fn backoff(&self, attempt: u32, error: &ProviderError) -> Duration {
        let exp = self.initial_backoff.saturating_mul(1u32 << (attempt - 1).min(16));
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                exp.max(Duration::from_secs(*retry_after_secs))
            }
            _ => exp,
        }
    }

    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = self.backoff(attempt, &e);
                    warn!(
                        client = %self.inner.name(),
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Transient model client failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    if attempt > 0 {
                        info!(client = %self.inner.name(), attempts = attempt + 1, "Giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.with_retries(|| self.inner.complete(request.clone())).await
    }

    async fn send(&self, request: ModelRequest) -> Result<ModelReply, ProviderError> {
        self.with_retries(|| self.inner.send(request.clone())).await
    }
}

//! Anthropic Messages API client.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level block list with `cache_control` markers
//! - Native `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, decoded into [`StreamDelta`]s

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};
use workbench_core::error::ProviderError;
use workbench_core::message::ContentBlock;
use workbench_core::provider::{
    ModelClient, ModelReply, ModelRequest, ModelResponse, StopReason, StreamDelta, Usage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API client.
pub struct AnthropicClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Answer `send()` with a delta stream instead of a finished message.
    streaming: bool,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            streaming: true,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable or disable streamed replies from `send()`.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn body(request: &ModelRequest, stream: bool) -> Result<serde_json::Value, ProviderError> {
        let mut body = serde_json::to_value(request).map_err(|e| ProviderError::ApiError {
            status_code: 0,
            message: format!("Failed to encode request: {e}"),
        })?;
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        Ok(body)
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let error_body = response.text().await.unwrap_or_default();
        Err(status_error(status, retry_after, error_body))
    }
}

/// Map a non-200 status to the provider error taxonomy.
fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(5),
        },
        _ => {
            warn!(status, body = %body, "Anthropic API error");
            ProviderError::ApiError {
                status_code: status,
                message: body,
            }
        }
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let body = Self::body(&request, false)?;
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self.post(&body, false).await?;
        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(api_resp.into_model_response())
    }

    async fn send(&self, request: ModelRequest) -> Result<ModelReply, ProviderError> {
        if !self.streaming {
            return self.complete(request).await.map(ModelReply::Message);
        }

        let body = Self::body(&request, true)?;
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLines::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                let complete = match lines.push(&bytes) {
                    Ok(complete) => complete,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for line in complete {
                    let Some(data) = line.strip_prefix("data:") else {
                        // `event:` lines repeat the type carried in the data payload
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match parse_sse_event(&event) {
                        Ok(Some(delta)) => {
                            let stop = delta == StreamDelta::MessageStop;
                            if tx.send(Ok(delta)).await.is_err() || stop {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            let _ = tx
                .send(Err(ProviderError::StreamInterrupted(
                    "stream ended before message_stop".into(),
                )))
                .await;
        });

        Ok(ModelReply::Stream(rx))
    }
}

/// Splits a byte stream into SSE lines.
///
/// Bytes are held until a full line has arrived, so a multi-byte character
/// split across network chunks decodes intact.
#[derive(Debug, Default)]
struct SseLines {
    pending: Vec<u8>,
}

impl SseLines {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line).map_err(|e| {
                ProviderError::StreamInterrupted(format!("invalid UTF-8 in event stream: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines)
    }
}

/// Decode one SSE `data:` payload into a delta.
///
/// Returns `Ok(None)` for events that carry nothing the engine needs
/// (pings, thinking blocks, empty text starts).
fn parse_sse_event(event: &serde_json::Value) -> Result<Option<StreamDelta>, ProviderError> {
    let index = event["index"].as_u64().unwrap_or(0) as usize;
    let delta = match event["type"].as_str().unwrap_or("") {
        "message_start" => StreamDelta::MessageStart {
            model: event["message"]["model"].as_str().unwrap_or("").to_string(),
        },
        "content_block_start" => {
            let block = &event["content_block"];
            match block["type"].as_str() {
                Some("tool_use") => StreamDelta::ToolUseStart {
                    index,
                    id: block["id"].as_str().unwrap_or("").to_string(),
                    name: block["name"].as_str().unwrap_or("").to_string(),
                },
                Some("text") => match block["text"].as_str() {
                    Some(text) if !text.is_empty() => StreamDelta::TextDelta {
                        index,
                        text: text.to_string(),
                    },
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        "content_block_delta" => {
            let delta = &event["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => StreamDelta::TextDelta {
                    index,
                    text: delta["text"].as_str().unwrap_or("").to_string(),
                },
                Some("input_json_delta") => StreamDelta::InputJsonDelta {
                    index,
                    partial_json: delta["partial_json"].as_str().unwrap_or("").to_string(),
                },
                _ => return Ok(None),
            }
        }
        "content_block_stop" => StreamDelta::BlockStop { index },
        "message_delta" => StreamDelta::MessageDelta {
            stop_reason: event["delta"]["stop_reason"]
                .as_str()
                .and_then(|s| serde_json::from_value(serde_json::json!(s)).ok()),
            usage: event["usage"]["output_tokens"].as_u64().map(|out| Usage {
                input_tokens: event["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                output_tokens: out as u32,
            }),
        },
        "message_stop" => StreamDelta::MessageStop,
        "error" => {
            let kind = event["error"]["type"].as_str().unwrap_or("error");
            let message = event["error"]["message"].as_str().unwrap_or("").to_string();
            return Err(match kind {
                "rate_limit_error" | "overloaded_error" => {
                    ProviderError::RateLimited { retry_after_secs: 5 }
                }
                "authentication_error" | "permission_error" => {
                    ProviderError::AuthenticationFailed(message)
                }
                _ => ProviderError::StreamInterrupted(format!("{kind}: {message}")),
            });
        }
        _ => return Ok(None),
    };
    Ok(Some(delta))
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

impl AnthropicResponse {
    fn into_model_response(self) -> ModelResponse {
        let content = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseContentBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                ResponseContentBlock::Other => None,
            })
            .collect();

        ModelResponse {
            content,
            stop_reason: self.stop_reason.unwrap_or_default(),
            usage: Some(Usage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            }),
            model: self.model,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// Claude API streaming client using reqwest-eventsource.
//
// Sends messages to the Anthropic Messages API with `stream: true` and parses
// the Server-Sent Events into `LlmEvent` variants forwarded over an mpsc
// channel. `collect_message` wraps the same stream for callers that only want
// the final text.

use anyhow::anyhow;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use valeris_core::config::Config;

use crate::LlmEvent;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

/// Low-level Claude API streaming client.
pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_endpoint(api_key, model, ANTHROPIC_API_URL.to_string())
    }

    /// Point the client at a different Messages endpoint (a proxy, or a
    /// local mock server in tests).
    pub fn with_endpoint(api_key: String, model: String, endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            endpoint,
        }
    }

    /// Send a message and stream the response as `LlmEvent`s over `tx`.
    ///
    /// Exactly one terminal event (`Complete` or `Error`) is sent unless the
    /// receiver is dropped first, in which case the stream is abandoned.
    pub async fn stream_message(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "API key not configured".to_string(),
                    generation,
                })
                .await;
            return Ok(());
        }

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "stream": true,
            "system": system,
            "messages": [{ "role": "user", "content": user_content }]
        });

        let request = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = match request.eventsource() {
            Ok(es) => es,
            Err(e) => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: format!("Failed to create event source: {e}"),
                        generation,
                    })
                    .await;
                return Ok(());
            }
        };

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;
        let mut stop_reason: Option<String> = None;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("SSE connection opened");
                }
                Ok(Event::Message(msg)) => match msg.event.as_str() {
                    "message_start" => {
                        match parse_input_tokens(&msg.data) {
                            Some(n) => input_tokens = n,
                            None => warn!("failed to parse input_tokens from message_start"),
                        }
                    }
                    "content_block_delta" => {
                        if let Some(text) = parse_delta_text(&msg.data) {
                            full_text.push_str(&text);
                            if tx.send(LlmEvent::Token { text, generation }).await.is_err() {
                                // Receiver gone; nobody is listening.
                                es.close();
                                return Ok(());
                            }
                        }
                    }
                    "message_delta" => {
                        if let Some(n) = parse_output_tokens(&msg.data) {
                            output_tokens = n;
                        }
                        if let Some(reason) = parse_stop_reason(&msg.data) {
                            stop_reason = Some(reason);
                        }
                        debug!(output_tokens, ?stop_reason, "message_delta");
                    }
                    "message_stop" => {
                        let _ = tx
                            .send(LlmEvent::Complete {
                                full_text,
                                input_tokens,
                                output_tokens,
                                stop_reason,
                                generation,
                            })
                            .await;
                        es.close();
                        return Ok(());
                    }
                    "error" => {
                        let message = parse_stream_error(&msg.data)
                            .unwrap_or_else(|| "API reported an error".to_string());
                        warn!(%message, "error event in SSE stream");
                        let _ = tx.send(LlmEvent::Error { message, generation }).await;
                        es.close();
                        return Ok(());
                    }
                    other => {
                        debug!(event_type = other, "ignoring SSE event");
                    }
                },
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    let _ = tx
                        .send(LlmEvent::Error {
                            message: extract_error_message(&err),
                            generation,
                        })
                        .await;
                    es.close();
                    return Ok(());
                }
            }
        }

        if full_text.is_empty() {
            let _ = tx
                .send(LlmEvent::Error {
                    message: "Stream ended unexpectedly without any content".to_string(),
                    generation,
                })
                .await;
        } else {
            let _ = tx
                .send(LlmEvent::Complete {
                    full_text,
                    input_tokens,
                    output_tokens,
                    stop_reason,
                    generation,
                })
                .await;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LlmClient wrapper
// ---------------------------------------------------------------------------

/// Either a configured Claude client or a disabled stand-in.
pub enum LlmClient {
    Active(ClaudeClient),
    /// No API key configured.
    Disabled,
}

impl LlmClient {
    /// `Active` when credentials carry a non-empty Anthropic key.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.anthropic_api_key {
            Some(key) if !key.trim().is_empty() => {
                LlmClient::Active(ClaudeClient::new(key.clone(), config.llm.model.clone()))
            }
            _ => LlmClient::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, LlmClient::Active(_))
    }

    pub async fn stream_message(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
        tx: mpsc::Sender<LlmEvent>,
        generation: u64,
    ) -> anyhow::Result<()> {
        match self {
            LlmClient::Active(client) => {
                client
                    .stream_message(system, user_content, max_tokens, tx, generation)
                    .await
            }
            LlmClient::Disabled => {
                let _ = tx
                    .send(LlmEvent::Error {
                        message: "LLM not configured".to_string(),
                        generation,
                    })
                    .await;
                Ok(())
            }
        }
    }

    /// Run a request to completion and return the full reply text.
    pub async fn collect_message(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let (tx, mut rx) = mpsc::channel(64);
        let stream = self.stream_message(system, user_content, max_tokens, tx, 0);
        let collect = async {
            let mut outcome = None;
            while let Some(event) = rx.recv().await {
                match event {
                    LlmEvent::Token { .. } => {}
                    LlmEvent::Complete { full_text, .. } => outcome = Some(Ok(full_text)),
                    LlmEvent::Error { message, .. } => outcome = Some(Err(anyhow!(message))),
                }
            }
            outcome.unwrap_or_else(|| Err(anyhow!("stream closed without a result")))
        };

        let (streamed, collected) = tokio::join!(stream, collect);
        streamed?;
        collected
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// `message_start`: `{ "message": { "usage": { "input_tokens": N } } }`
pub(crate) fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("message")?
        .get("usage")?
        .get("input_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// `content_block_delta`: `{ "delta": { "type": "text_delta", "text": "..." } }`
pub(crate) fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// `message_delta`: `{ "usage": { "output_tokens": N } }`
pub(crate) fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("usage")?
        .get("output_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// `message_delta`: `{ "delta": { "stop_reason": "end_turn" } }`
pub(crate) fn parse_stop_reason(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("stop_reason")?
        .as_str()
        .map(|s| s.to_string())
}

/// `error`: `{ "type": "error", "error": { "type": "...", "message": "..." } }`
pub(crate) fn parse_stream_error(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn extract_error_message(err: &reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _response) => {
            format!("API returned status {status}")
        }
        reqwest_eventsource::Error::Transport(e) => format!("Network error: {e}"),
        other => format!("Stream error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

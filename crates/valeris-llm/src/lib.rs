// Streaming LLM client for the AI trading coach.

pub mod client;

pub use client::{ClaudeClient, LlmClient};

/// Events emitted by a streaming completion. Every variant carries the
/// generation of the request that produced it so the consumer can drop
/// events from cancelled requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    /// A chunk of streamed text.
    Token { text: String, generation: u64 },
    /// The stream finished.
    Complete {
        full_text: String,
        input_tokens: u32,
        output_tokens: u32,
        stop_reason: Option<String>,
        generation: u64,
    },
    /// The request failed before or during streaming.
    Error { message: String, generation: u64 },
}

impl LlmEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LlmEvent::Token { generation, .. }
            | LlmEvent::Complete { generation, .. }
            | LlmEvent::Error { generation, .. } => *generation,
        }
    }
}

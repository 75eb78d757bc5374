use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One assistant turn as returned by a backend
#[derive(Debug, Clone)]
pub struct Completion {
    /// Assistant message holding the response text and the tool calls in issue order.
    /// No tool calls means the model gave its final answer.
    pub message: Message,
    /// The backend's own reason for stopping, e.g. `end_turn` or `tool_calls`
    pub stop_reason: String,
    pub usage: Usage,
}

impl Completion {
    pub fn new<S: Into<String>>(message: Message, stop_reason: S, usage: Usage) -> Self {
        Self {
            message,
            stop_reason: stop_reason.into(),
            usage,
        }
    }
}

/// Base trait for AI providers (Anthropic, OpenAI)
///
/// One call is exactly one request/response exchange. System messages in `messages` are
/// passed through whatever channel the backend uses for them.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Completion>;
}

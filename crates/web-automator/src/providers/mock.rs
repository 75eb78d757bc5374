use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Message>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Like `new`, but individual turns may fail
    pub fn with_results(responses: Vec<Result<Message>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every transcript the provider was asked to complete, in order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, messages: &[Message], _tools: &[Tool]) -> Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            return Ok(Completion::new(
                Message::assistant().with_text(""),
                "end_turn",
                Usage::default(),
            ));
        }
        let message = responses
            .remove(0)
            .map_err(|e| anyhow!("mock provider failure: {}", e))?;
        Ok(Completion::new(message, "end_turn", Usage::default()))
    }
}

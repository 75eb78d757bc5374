use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{Completion, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_completion,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let error_text = response.text().await?;
                Err(anyhow!("Request failed: {} - {}", status, error_text))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<Completion> {
        // the system prompt is already the leading message of the transcript
        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = tools_to_openai_spec(tools)?;

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_spec,
        });
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        debug!(model = %self.config.model, messages = messages.len(), "openai request");
        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        openai_response_to_completion(&response)
    }
}

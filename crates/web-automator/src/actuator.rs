//! The contract the agent uses to act on a web page.
//!
//! Every tool that is not handled by the agent itself is forwarded to an [`Actuator`]. An
//! actuator reports expected failures through [`ToolResult::error`]; an `Err` from any of
//! its methods is a fault that ends the run.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::tool::JsonObject;

/// Outcome of one actuator action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    /// `output` holds base64 png data
    #[serde(rename = "isImage", default)]
    pub is_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok<S: Into<String>>(output: S) -> Self {
        Self {
            success: true,
            output: output.into(),
            is_image: false,
            error: None,
        }
    }

    pub fn image<S: Into<String>>(data: S) -> Self {
        Self {
            success: true,
            output: data.into(),
            is_image: true,
            error: None,
        }
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            output: String::new(),
            is_image: false,
            error: Some(error.into()),
        }
    }

    /// A present error wins over the success flag
    pub fn succeeded(&self) -> bool {
        self.success && self.error.is_none()
    }

    /// The text the model should see: the error when there is one, else the output
    pub fn text(&self) -> &str {
        self.error.as_deref().unwrap_or(&self.output)
    }
}

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Acquire whatever the actuator needs before the first action
    async fn start(&self) -> Result<()>;

    /// Release the session; called once on every exit path of a run that owns it
    async fn stop(&self) -> Result<()>;

    async fn execute(&self, name: &str, arguments: &JsonObject) -> Result<ToolResult>;
}

/// Creates a fresh actuator session for each run
pub trait ActuatorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Actuator>>;
}

/// Where a run gets its actuator from
#[derive(Clone)]
pub enum ActuatorSource {
    /// Started and owned by the caller; the run never stops it
    Shared(Arc<dyn Actuator>),
    /// Created, started and stopped by each run
    Owned(Arc<dyn ActuatorFactory>),
}

/// Keep at most `cap` characters of `text`
pub fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorSettings {
    /// Run a browser-backed actuator without a window. The http actuator never opens
    /// one and ignores this.
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_page_text_cap")]
    pub page_text_cap: usize,
    #[serde(default = "default_html_cap")]
    pub html_cap: usize,
    /// Rewrite `http://` urls to `https://` before navigating
    #[serde(default = "default_upgrade_insecure")]
    pub upgrade_insecure: bool,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            user_agent: default_user_agent(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            page_text_cap: default_page_text_cap(),
            html_cap: default_html_cap(),
            upgrade_insecure: default_upgrade_insecure(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; WebAutomator/0.1)".to_string()
}

fn default_navigation_timeout_ms() -> u64 {
    30000
}

fn default_page_text_cap() -> usize {
    8000
}

fn default_html_cap() -> usize {
    60000
}

fn default_upgrade_insecure() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_authoritative() {
        let result = ToolResult {
            success: true,
            output: "looked fine".to_string(),
            is_image: false,
            error: Some("selector not found".to_string()),
        };
        assert!(!result.succeeded());
        assert_eq!(result.text(), "selector not found");

        let result = ToolResult::ok("clicked");
        assert!(result.succeeded());
        assert_eq!(result.text(), "clicked");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_serialization_uses_is_image_key() {
        let value = serde_json::to_value(ToolResult::image("aGVsbG8=")).unwrap();
        assert_eq!(value["isImage"], true);
        assert!(value.get("error").is_none());
    }
}

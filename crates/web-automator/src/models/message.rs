use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::role::Role;
use super::tool::{JsonObject, ToolCall};
use crate::errors::{AgentError, AgentResult};

/// An image attached to a tool result, base64 encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

/// A tool call as the model emitted it. The arguments are an error when the backend
/// sent something that could not be decoded into an object; the id and name are kept
/// so the call can still be answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: AgentResult<JsonObject>,
}

impl ToolRequest {
    pub fn new<I: Into<String>, N: Into<String>>(
        id: I,
        name: N,
        arguments: AgentResult<JsonObject>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The decoded call, or the decode error the adapter recorded
    pub fn tool_call(&self) -> AgentResult<ToolCall> {
        let arguments = self.arguments.clone()?;
        Ok(ToolCall::new(&self.id, &self.name, arguments))
    }

    /// Arguments to echo back to a backend; undecodable arguments are sent as `{}`
    pub fn wire_arguments(&self) -> JsonObject {
        self.arguments.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One conversation turn, independent of any backend
pub struct Message {
    pub role: Role,
    pub created: i64,
    /// Absent or empty on assistant turns that only call tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Only on assistant turns, in the order the model issued them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolRequest>,
    /// Only on tool turns: the id of the call this result answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Only on tool turns: the name of the tool that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageContent>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            image: None,
        }
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System).with_text(text)
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User).with_text(text)
    }

    /// Create an empty assistant message; add text and tool requests with the builders
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool result answering the call with `tool_call_id`
    pub fn tool<I, N, S>(tool_call_id: I, name: N, output: S) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut message = Self::new(Role::Tool).with_text(output);
        message.tool_call_id = Some(tool_call_id.into());
        message.name = Some(name.into());
        message
    }

    /// Set the text content of the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    /// Append a tool request to the message
    pub fn with_tool_request(mut self, request: ToolRequest) -> Self {
        self.tool_calls.push(request);
        self
    }

    /// Attach an image to the message
    pub fn with_image<S: Into<String>, T: Into<String>>(mut self, data: S, mime_type: T) -> Self {
        self.image = Some(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
        });
        self
    }

    /// Text content, empty when absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Check that every tool message answers a call of the immediately preceding assistant
/// message, in issue order, and that every such call is answered.
pub fn verify_tool_pairing(messages: &[Message]) -> AgentResult<()> {
    let mut index = 0;
    while index < messages.len() {
        let message = &messages[index];
        index += 1;
        match message.role {
            Role::Tool => {
                return Err(AgentError::Internal(format!(
                    "tool result {:?} does not follow an assistant turn",
                    message.tool_call_id
                )));
            }
            Role::Assistant if message.has_tool_calls() => {
                for request in &message.tool_calls {
                    let answer = messages.get(index).filter(|m| m.role == Role::Tool);
                    match answer {
                        Some(answer) if answer.tool_call_id.as_deref() == Some(&request.id) => {
                            index += 1
                        }
                        _ => {
                            return Err(AgentError::Internal(format!(
                                "tool call '{}' is not answered in order",
                                request.id
                            )))
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use super::base::{Completion, Usage};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::{ImageContent, Message, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::{JsonObject, Tool};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub enum ImageFormat {
    OpenAi,
    Anthropic,
}

/// Convert an image content into an image json based on format
pub fn convert_image(image: &ImageContent, image_format: &ImageFormat) -> Value {
    match image_format {
        ImageFormat::OpenAi => json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{};base64,{}", image.mime_type, image.data)
            }
        }),
        ImageFormat::Anthropic => json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": image.data,
            }
        }),
    }
}

/// Convert internal Message format to OpenAI's API message specification
///
/// System messages stay ordinary leading messages. Images from tool results cannot live in
/// a tool message, so they are gathered into one user message placed after the run of
/// tool messages they came from.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();
    let mut pending_images: Vec<Value> = Vec::new();

    for message in messages {
        if message.role != Role::Tool {
            flush_openai_images(&mut messages_spec, &mut pending_images);
        }

        match message.role {
            Role::Tool => {
                messages_spec.push(json!({
                    "role": "tool",
                    "tool_call_id": message.tool_call_id,
                    "content": message.text(),
                }));
                if let Some(image) = &message.image {
                    pending_images.push(convert_image(image, &ImageFormat::OpenAi));
                }
            }
            Role::Assistant if message.has_tool_calls() => {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|request| {
                        json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&request.name),
                                "arguments": Value::Object(request.wire_arguments()).to_string(),
                            }
                        })
                    })
                    .collect();

                // content may be null when the turn only calls tools
                let content = message.content.as_deref().filter(|text| !text.is_empty());
                messages_spec.push(json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                }));
            }
            role => {
                messages_spec.push(json!({
                    "role": role.as_str(),
                    "content": message.text(),
                }));
            }
        }
    }
    flush_openai_images(&mut messages_spec, &mut pending_images);

    messages_spec
}

fn flush_openai_images(messages_spec: &mut Vec<Value>, pending_images: &mut Vec<Value>) {
    if pending_images.is_empty() {
        return;
    }
    let mut content = vec![json!({
        "type": "text",
        "text": "Images returned by the tool calls above."
    })];
    content.append(pending_images);
    messages_spec.push(json!({
        "role": "user",
        "content": content,
    }));
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to a completion
pub fn openai_response_to_completion(response: &Value) -> Result<Completion> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| anyhow!("Invalid response format from OpenAI API: no choices"))?;
    let original = &choice["message"];

    let mut message = Message::assistant();
    if let Some(text) = original.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw_arguments = &tool_call["function"]["arguments"];

            let arguments = if !is_valid_function_name(&function_name) {
                Err(AgentError::InvalidParameters(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                )))
            } else {
                decode_openai_arguments(&id, raw_arguments)
            };
            message = message.with_tool_request(ToolRequest::new(id, function_name, arguments));
        }
    }

    let stop_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .unwrap_or("stop");

    Ok(Completion::new(message, stop_reason, openai_usage(response)))
}

/// OpenAI sends arguments as a json encoded string
fn decode_openai_arguments(id: &str, raw: &Value) -> AgentResult<JsonObject> {
    let encoded = match raw {
        Value::String(encoded) => encoded.as_str(),
        Value::Null => "",
        // some compatible servers inline the object
        Value::Object(arguments) => return Ok(arguments.clone()),
        other => {
            return Err(AgentError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: unexpected {}",
                id, other
            )))
        }
    };
    if encoded.trim().is_empty() {
        return Ok(JsonObject::new());
    }

    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(AgentError::InvalidParameters(format!(
            "Could not interpret tool use parameters for id {}: expected an object, got {}",
            id, other
        ))),
        Err(e) => Err(AgentError::InvalidParameters(format!(
            "Could not interpret tool use parameters for id {}: {}",
            id, e
        ))),
    }
}

fn openai_usage(data: &Value) -> Usage {
    let usage = &data["usage"];
    let input_tokens = usage["prompt_tokens"].as_i64().map(|v| v as i32);
    let output_tokens = usage["completion_tokens"].as_i64().map(|v| v as i32);
    let total_tokens = usage["total_tokens"]
        .as_i64()
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// Convert internal Message format to Anthropic's API message specification
///
/// Returns the system text separately since Anthropic takes it as a top level field.
/// Consecutive tool results are grouped into one user turn of `tool_result` blocks.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> (String, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages_spec: Vec<Value> = Vec::new();
    let mut open_tool_results = false;

    for message in messages {
        match message.role {
            Role::System => {
                if !message.text().is_empty() {
                    system_parts.push(message.text());
                }
                continue;
            }
            Role::Tool => {
                let content = match &message.image {
                    Some(image) => json!([
                        {"type": "text", "text": message.text()},
                        convert_image(image, &ImageFormat::Anthropic),
                    ]),
                    None => json!(message.text()),
                };
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": content,
                });

                if open_tool_results {
                    if let Some(blocks) = messages_spec
                        .last_mut()
                        .and_then(|last| last.get_mut("content"))
                        .and_then(Value::as_array_mut)
                    {
                        blocks.push(block);
                        continue;
                    }
                }
                messages_spec.push(json!({
                    "role": "user",
                    "content": [block],
                }));
                open_tool_results = true;
                continue;
            }
            Role::Assistant if message.has_tool_calls() => {
                let mut blocks = Vec::new();
                if !message.text().is_empty() {
                    blocks.push(json!({"type": "text", "text": message.text()}));
                }
                for request in &message.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": request.name,
                        "input": Value::Object(request.wire_arguments()),
                    }));
                }
                messages_spec.push(json!({
                    "role": "assistant",
                    "content": blocks,
                }));
            }
            role => {
                messages_spec.push(json!({
                    "role": role.as_str(),
                    "content": message.text(),
                }));
            }
        }
        open_tool_results = false;
    }

    (system_parts.join("\n\n"), messages_spec)
}

/// Convert internal Tool format to Anthropic's API tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        }));
    }

    Ok(result)
}

/// Convert Anthropic's API response to a completion
pub fn anthropic_response_to_completion(response: &Value) -> Result<Completion> {
    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

    let mut text_parts: Vec<&str> = Vec::new();
    let mut requests = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str() {
                    text_parts.push(text);
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default();
                let name = block["name"].as_str().unwrap_or_default();
                let arguments = decode_anthropic_input(id, &block["input"]);
                requests.push(ToolRequest::new(id, name, arguments));
            }
            _ => {}
        }
    }

    let mut message = Message::assistant();
    let text = text_parts.join("\n");
    if !text.is_empty() {
        message = message.with_text(text);
    }
    for request in requests {
        message = message.with_tool_request(request);
    }

    let stop_reason = response["stop_reason"].as_str().unwrap_or("end_turn");
    Ok(Completion::new(message, stop_reason, anthropic_usage(response)))
}

/// Anthropic sends arguments inline as structured values
fn decode_anthropic_input(id: &str, input: &Value) -> AgentResult<JsonObject> {
    match input {
        Value::Object(arguments) => Ok(arguments.clone()),
        Value::Null => Ok(JsonObject::new()),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(arguments)) => Ok(arguments),
            _ => Err(AgentError::InvalidParameters(format!(
                "Could not interpret tool use input for id {}: {}",
                id, encoded
            ))),
        },
        other => Err(AgentError::InvalidParameters(format!(
            "Could not interpret tool use input for id {}: expected an object, got {}",
            id, other
        ))),
    }
}

fn anthropic_usage(data: &Value) -> Usage {
    let usage = &data["usage"];
    let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
    let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
    let total_tokens = match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    };
    Usage::new(input_tokens, output_tokens, total_tokens)
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

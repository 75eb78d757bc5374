use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments of a tool call, keyed by parameter name.
pub type JsonObject = Map<String, Value>;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema object with `type`, `properties` and `required`
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Field names listed under `required` in the parameter schema
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }
}

/// A decoded tool invocation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Backend assigned id, unique within the turn
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: JsonObject,
}

impl ToolCall {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, name: S, arguments: JsonObject) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// String value of an argument, if present and a string
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_fields() {
        let tool = Tool::new(
            "type",
            "Type text",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string"},
                    "text": {"type": "string"}
                },
                "required": ["selector", "text"]
            }),
        );
        assert_eq!(tool.required().collect::<Vec<_>>(), vec!["selector", "text"]);

        let bare = Tool::new("screenshot", "Capture", json!({"type": "object"}));
        assert_eq!(bare.required().count(), 0);
    }
}

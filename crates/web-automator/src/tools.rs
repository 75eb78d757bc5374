//! The fixed set of tools offered to every backend, and the argument check run before
//! any of them executes.
use lazy_static::lazy_static;
use serde_json::json;
use std::collections::HashMap;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{JsonObject, Tool};

pub const DONE: &str = "done";
pub const LIST_SKILLS: &str = "list_skills";
pub const READ_SKILL: &str = "read_skill";
pub const WRITE_TEST: &str = "write_test";

/// Tools the agent answers itself. These never reach the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaTool {
    Done,
    ListSkills,
    ReadSkill,
    WriteTest,
}

/// Where a call to a tool is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Meta(MetaTool),
    Actuator,
}

struct CatalogEntry {
    tool: Tool,
    kind: ToolKind,
}

/// Process-wide, read-only registry of tool schemas
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

lazy_static! {
    static ref CATALOG: ToolCatalog = ToolCatalog::new(builtin_entries());
}

impl ToolCatalog {
    fn new(entries: Vec<CatalogEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.tool.name.clone(), position))
            .collect();
        Self { entries, index }
    }

    /// The shared catalog
    pub fn global() -> &'static ToolCatalog {
        &CATALOG
    }

    /// Schemas in their stable declaration order
    pub fn schemas(&self) -> Vec<Tool> {
        self.entries.iter().map(|entry| entry.tool.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&position| &self.entries[position].tool)
    }

    /// Routing for `name`, `None` when the catalog does not know it
    pub fn kind(&self, name: &str) -> Option<ToolKind> {
        self.index.get(name).map(|&position| self.entries[position].kind)
    }

    /// Check that the tool exists and every required field is present. Values are not
    /// type checked; the executing side interprets them.
    pub fn validate(&self, name: &str, arguments: &JsonObject) -> AgentResult<()> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        match tool.required().find(|field| !arguments.contains_key(*field)) {
            Some(field) => Err(AgentError::MissingArgument {
                tool: name.to_string(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn actuator(tool: Tool) -> CatalogEntry {
    CatalogEntry {
        tool,
        kind: ToolKind::Actuator,
    }
}

fn meta(meta: MetaTool, tool: Tool) -> CatalogEntry {
    CatalogEntry {
        tool,
        kind: ToolKind::Meta(meta),
    }
}

fn no_parameters() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

fn builtin_entries() -> Vec<CatalogEntry> {
    vec![
        actuator(Tool::new(
            "navigate",
            "Navigate the browser to a URL.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The URL to navigate to."}
                },
                "required": ["url"]
            }),
        )),
        actuator(Tool::new(
            "click",
            "Click on an element identified by a CSS selector or visible text.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector or visible text of the element to click."
                    }
                },
                "required": ["selector"]
            }),
        )),
        actuator(Tool::new(
            "type",
            "Type text into an input field identified by a CSS selector.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the input element."
                    },
                    "text": {"type": "string", "description": "Text to type."}
                },
                "required": ["selector", "text"]
            }),
        )),
        actuator(Tool::new(
            "scroll",
            "Scroll the page up or down.",
            json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down"],
                        "description": "Scroll direction."
                    },
                    "amount": {
                        "type": "integer",
                        "description": "Number of pixels to scroll (default 500).",
                        "default": 500
                    }
                },
                "required": ["direction"]
            }),
        )),
        actuator(Tool::new(
            "wait_for",
            "Wait for an element matching a CSS selector to appear on the page.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector to wait for."
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Maximum wait time in milliseconds (default 10000).",
                        "default": 10000
                    }
                },
                "required": ["selector"]
            }),
        )),
        actuator(Tool::new(
            "screenshot",
            "Capture a screenshot of the current page. \
             Returns a base64-encoded PNG image so you can see the page state.",
            no_parameters(),
        )),
        actuator(Tool::new(
            "get_page_content",
            "Return the simplified text content of the current page (title + visible text).",
            no_parameters(),
        )),
        actuator(Tool::new(
            "extract",
            "Extract specific information from the current page based on a description.",
            json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "description": "Description of what to extract (e.g. 'all product names and prices')."
                    }
                },
                "required": ["description"]
            }),
        )),
        meta(
            MetaTool::Done,
            Tool::new(
                DONE,
                "Signal that the task is complete. \
                 Call this when you have finished all required actions and have a final answer.",
                json!({
                    "type": "object",
                    "properties": {
                        "result": {
                            "type": "string",
                            "description": "The final result or answer to return to the user."
                        }
                    },
                    "required": ["result"]
                }),
            ),
        ),
        actuator(Tool::new(
            "get_html",
            "Return the raw HTML of the current page or a scoped element. \
             Use this before writing Playwright tests so you can inspect real \
             attributes (id, data-testid, aria-label, name) to build reliable locators.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "Optional CSS selector to scope the HTML to one element."
                    }
                },
                "required": []
            }),
        )),
        meta(
            MetaTool::WriteTest,
            Tool::new(
                WRITE_TEST,
                "Write a Playwright test file to the generated tests directory. \
                 Use after generating test code from the page HTML.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": {
                            "type": "string",
                            "description": "File name, e.g. 'test_login.py'."
                        },
                        "content": {
                            "type": "string",
                            "description": "Full Python pytest-playwright test file content."
                        }
                    },
                    "required": ["filename", "content"]
                }),
            ),
        ),
        meta(
            MetaTool::ListSkills,
            Tool::new(
                LIST_SKILLS,
                "List the names of all available skill playbooks. \
                 Call this to discover which skills exist before loading one.",
                no_parameters(),
            ),
        ),
        meta(
            MetaTool::ReadSkill,
            Tool::new(
                READ_SKILL,
                "Read the contents of a named skill playbook. \
                 Use the names returned by list_skills. \
                 The playbook contains step-by-step guidance for completing common tasks.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "The skill name (without .md extension), e.g. 'google_search'."
                        }
                    },
                    "required": ["name"]
                }),
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_schema_order_is_stable() {
        let names: Vec<String> = ToolCatalog::global()
            .schemas()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "navigate",
                "click",
                "type",
                "scroll",
                "wait_for",
                "screenshot",
                "get_page_content",
                "extract",
                "done",
                "get_html",
                "write_test",
                "list_skills",
                "read_skill",
            ]
        );
    }

    #[test]
    fn test_schemas_are_object_schemas() {
        for tool in ToolCatalog::global().schemas() {
            assert_eq!(tool.parameters["type"], "object", "{}", tool.name);
            assert!(tool.parameters["properties"].is_object(), "{}", tool.name);
            assert!(tool.parameters["required"].is_array(), "{}", tool.name);
        }
    }

    #[test]
    fn test_validate_unknown_tool() {
        let err = ToolCatalog::global()
            .validate("teleport", &JsonObject::new())
            .unwrap_err();
        assert_eq!(err, AgentError::ToolNotFound("teleport".into()));
    }

    #[test]
    fn test_validate_missing_required() {
        let err = ToolCatalog::global()
            .validate("type", &args(serde_json::json!({"selector": "#q"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required argument 'text' for tool 'type'");
    }

    #[test]
    fn test_validate_ok_iff_required_present() {
        let catalog = ToolCatalog::global();
        for tool in catalog.schemas() {
            let required: Vec<String> = tool.required().map(String::from).collect();
            let full: JsonObject = required
                .iter()
                .map(|field| (field.clone(), Value::Null))
                .collect();
            assert!(catalog.validate(&tool.name, &full).is_ok(), "{}", tool.name);

            for skipped in &required {
                let mut partial = full.clone();
                partial.remove(skipped);
                assert!(catalog.validate(&tool.name, &partial).is_err());
            }
        }
    }

    #[test]
    fn test_validate_ignores_values_and_extras() {
        let catalog = ToolCatalog::global();
        let arguments = args(serde_json::json!({"url": 42, "extra": true}));
        assert!(catalog.validate("navigate", &arguments).is_ok());
        assert!(catalog.validate("get_html", &JsonObject::new()).is_ok());
    }

    #[test]
    fn test_kinds() {
        let catalog = ToolCatalog::global();
        assert_eq!(catalog.kind(DONE), Some(ToolKind::Meta(MetaTool::Done)));
        assert_eq!(catalog.kind(READ_SKILL), Some(ToolKind::Meta(MetaTool::ReadSkill)));
        assert_eq!(catalog.kind("click"), Some(ToolKind::Actuator));
        assert_eq!(catalog.kind("nope"), None);
    }
}

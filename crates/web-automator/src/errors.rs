use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that are answered to the model as a failed tool result rather than
/// ending the run.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Unknown tool: '{0}'")]
    ToolNotFound(String),

    #[error("Missing required argument '{field}' for tool '{tool}'")]
    MissingArgument { tool: String, field: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

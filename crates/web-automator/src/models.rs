//! These models represent the objects passed around by the agent
//!
//! There are several different related formats we need to interact with:
//! - anthropic messages/tools, where the system prompt travels beside the messages and
//!   tool calls are typed content blocks
//! - openai messages/tools, where the system prompt is an ordinary message and tool calls
//!   are a separate list with json-encoded arguments
//! - actuator requests, sent from the agent to whatever drives the page
//!
//! We always immediately convert those formats into the internal structs using the
//! helpers in `providers::utils`, so the internal models are not an exact match to either.
pub mod message;
pub mod role;
pub mod tool;

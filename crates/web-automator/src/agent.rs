use anyhow::{anyhow, Result};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::actuator::{truncate_chars, Actuator, ActuatorFactory, ActuatorSource};
use crate::models::message::{verify_tool_pairing, Message, ToolRequest};
use crate::models::tool::{JsonObject, ToolCall};
use crate::playbooks::PlaybookStore;
use crate::prompt_template::system_prompt;
use crate::providers::base::Provider;
use crate::test_sink::TestSink;
use crate::tools::{MetaTool, ToolCatalog, ToolKind};

/// Error classification of a run that ran out of steps
pub const MAX_STEPS_EXCEEDED: &str = "max_steps_exceeded";
pub const MAX_STEPS_MESSAGE: &str = "Max steps reached without completing the task.";

const NO_RESPONSE: &str = "(no response)";
const NO_PLAYBOOKS: &str = "(no skills found)";
const IMAGE_PLACEHOLDER: &str = "[screenshot attached]";
const IMAGE_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model round trips per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Characters of each tool output kept in the step log. The model always sees the
    /// full output.
    #[serde(default = "default_step_output_cap")]
    pub step_output_cap: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_output_cap: default_step_output_cap(),
        }
    }
}

fn default_max_steps() -> usize {
    20
}

fn default_step_output_cap() -> usize {
    500
}

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// The model round trip the call belongs to, starting at 1
    pub step_number: usize,
    pub tool_name: String,
    pub tool_args: JsonObject,
    pub tool_result: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    BudgetExhausted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub result: String,
    pub steps: Vec<Step>,
    pub success: bool,
    pub error: Option<String>,
    pub outcome: Outcome,
}

impl RunResult {
    fn completed(result: String, steps: Vec<Step>) -> Self {
        Self {
            result,
            steps,
            success: true,
            error: None,
            outcome: Outcome::Completed,
        }
    }

    fn budget_exhausted(steps: Vec<Step>) -> Self {
        Self {
            result: MAX_STEPS_MESSAGE.to_string(),
            steps,
            success: false,
            error: Some(MAX_STEPS_EXCEEDED.to_string()),
            outcome: Outcome::BudgetExhausted,
        }
    }

    fn failed(fault: &anyhow::Error, steps: Vec<Step>) -> Self {
        Self {
            result: format!("Agent error: {}", fault),
            steps,
            success: false,
            error: Some(fault.to_string()),
            outcome: Outcome::Failed,
        }
    }
}

/// How the loop stopped when nothing went wrong
enum Finish {
    Answered(String),
    OutOfSteps,
}

/// What answering one tool call produced
struct CallOutcome {
    output: String,
    success: bool,
    image: Option<String>,
    /// Set by `done`
    answer: Option<String>,
}

impl CallOutcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
            image: None,
            answer: None,
        }
    }

    fn failed(output: String) -> Self {
        Self {
            output,
            success: false,
            image: None,
            answer: None,
        }
    }
}

/// Agent drives a model through tool calls against an actuator until it answers
pub struct Agent {
    provider: Box<dyn Provider>,
    actuator: ActuatorSource,
    config: AgentConfig,
    playbooks: Option<Arc<dyn PlaybookStore>>,
    test_sink: Option<Arc<dyn TestSink>>,
}

impl Agent {
    /// Create a new Agent with the specified provider and actuator
    pub fn new(provider: Box<dyn Provider>, actuator: ActuatorSource) -> Self {
        Self {
            provider,
            actuator,
            config: AgentConfig::default(),
            playbooks: None,
            test_sink: None,
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_playbooks(mut self, playbooks: Arc<dyn PlaybookStore>) -> Self {
        self.playbooks = Some(playbooks);
        self
    }

    pub fn with_test_sink(mut self, test_sink: Arc<dyn TestSink>) -> Self {
        self.test_sink = Some(test_sink);
        self
    }

    /// Run one task to completion. Faults are reported in the result, never returned.
    pub async fn run(&self, task: &str) -> RunResult {
        info!(max_steps = self.config.max_steps, "starting run: {}", task);

        let mut steps = Vec::new();
        let finish = match &self.actuator {
            ActuatorSource::Shared(actuator) => {
                catch_panic(self.drive(task, actuator.as_ref(), &mut steps)).await
            }
            ActuatorSource::Owned(factory) => {
                self.drive_owned(task, factory.as_ref(), &mut steps).await
            }
        };

        let result = match finish {
            Ok(Finish::Answered(answer)) => RunResult::completed(answer, steps),
            Ok(Finish::OutOfSteps) => {
                warn!(max_steps = self.config.max_steps, "step budget exhausted");
                RunResult::budget_exhausted(steps)
            }
            Err(fault) => {
                error!("run failed: {:#}", fault);
                RunResult::failed(&fault, steps)
            }
        };

        info!(
            outcome = ?result.outcome,
            steps = result.steps.len(),
            "run finished"
        );
        result
    }

    /// Run with a session this run creates, starts and always stops
    async fn drive_owned(
        &self,
        task: &str,
        factory: &dyn ActuatorFactory,
        steps: &mut Vec<Step>,
    ) -> Result<Finish> {
        let actuator: Arc<dyn Actuator> = Arc::from(factory.create()?);
        // stops the session even if this future is dropped mid-run
        let guard = StopGuard::new(actuator.clone());

        let finish = match catch_panic(actuator.start()).await {
            Ok(()) => catch_panic(self.drive(task, actuator.as_ref(), steps)).await,
            Err(err) => Err(err),
        };

        guard.stop().await;
        finish
    }

    fn system_prompt(&self) -> Result<String> {
        let has_playbooks = self
            .playbooks
            .as_ref()
            .map(|store| !store.list_names().is_empty())
            .unwrap_or(false);
        Ok(system_prompt(has_playbooks)?)
    }

    async fn drive(
        &self,
        task: &str,
        actuator: &dyn Actuator,
        steps: &mut Vec<Step>,
    ) -> Result<Finish> {
        let tools = ToolCatalog::global().schemas();
        let mut messages = vec![Message::system(self.system_prompt()?), Message::user(task)];

        for iteration in 1..=self.config.max_steps {
            let completion = self.provider.complete(&messages, &tools).await?;
            debug!(
                iteration,
                stop_reason = %completion.stop_reason,
                input_tokens = ?completion.usage.input_tokens,
                output_tokens = ?completion.usage.output_tokens,
                "completion received"
            );

            let response = completion.message;
            let requests = response.tool_calls.clone();
            let text = response.text().to_string();
            messages.push(response);

            if requests.is_empty() {
                let answer = if text.is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    text
                };
                return Ok(Finish::Answered(answer));
            }

            // every call in the batch is answered, even after `done`
            let mut answer: Option<String> = None;
            for request in &requests {
                let outcome = self.answer(request, actuator, answer.is_some()).await?;
                if answer.is_none() {
                    answer = outcome.answer.clone();
                }

                steps.push(Step {
                    step_number: iteration,
                    tool_name: request.name.clone(),
                    tool_args: request.wire_arguments(),
                    tool_result: truncate_chars(&outcome.output, self.config.step_output_cap),
                    success: outcome.success,
                });
                debug!(
                    iteration,
                    tool = %request.name,
                    success = outcome.success,
                    "tool call answered"
                );

                let mut reply = Message::tool(&request.id, &request.name, outcome.output);
                if let Some(data) = outcome.image {
                    reply = reply.with_image(data, IMAGE_MIME_TYPE);
                }
                messages.push(reply);
            }
            debug_assert!(verify_tool_pairing(&messages).is_ok());

            if let Some(answer) = answer {
                return Ok(Finish::Answered(answer));
            }
        }

        Ok(Finish::OutOfSteps)
    }

    /// Produce the result for one call. Only actuator faults escape as `Err`.
    async fn answer(
        &self,
        request: &ToolRequest,
        actuator: &dyn Actuator,
        terminated: bool,
    ) -> Result<CallOutcome> {
        let catalog = ToolCatalog::global();

        let call = match request.tool_call() {
            Ok(call) => call,
            Err(err) => {
                warn!(tool = %request.name, "undecodable tool call: {}", err);
                return Ok(CallOutcome::failed(format!("ERROR: {}", err)));
            }
        };
        if let Err(err) = catalog.validate(&call.name, &call.arguments) {
            warn!(tool = %call.name, "rejected tool call: {}", err);
            return Ok(CallOutcome::failed(format!("ERROR: {}", err)));
        }

        match catalog.kind(&call.name) {
            Some(ToolKind::Meta(meta)) => Ok(self.answer_meta(meta, &call)),
            Some(ToolKind::Actuator) if terminated => {
                warn!(tool = %call.name, "skipping tool call issued after done");
                Ok(CallOutcome::failed(format!(
                    "SKIPPED: '{}' was not executed because the task is already done",
                    call.name
                )))
            }
            Some(ToolKind::Actuator) => {
                let result = actuator.execute(&call.name, &call.arguments).await?;
                if !result.succeeded() {
                    warn!(tool = %call.name, "actuator reported: {}", result.text());
                    return Ok(CallOutcome::failed(result.text().to_string()));
                }
                if result.is_image {
                    return Ok(CallOutcome {
                        output: IMAGE_PLACEHOLDER.to_string(),
                        success: true,
                        image: Some(result.output),
                        answer: None,
                    });
                }
                Ok(CallOutcome::ok(result.output))
            }
            None => Ok(CallOutcome::failed(format!(
                "ERROR: Unknown tool: '{}'",
                call.name
            ))),
        }
    }

    fn answer_meta(&self, meta: MetaTool, call: &ToolCall) -> CallOutcome {
        match meta {
            MetaTool::Done => {
                let answer = match call.arguments.get("result") {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                CallOutcome {
                    output: answer.clone(),
                    success: true,
                    image: None,
                    answer: Some(answer),
                }
            }
            MetaTool::ListSkills => {
                let names = self
                    .playbooks
                    .as_ref()
                    .map(|store| store.list_names())
                    .unwrap_or_default();
                if names.is_empty() {
                    CallOutcome::ok(NO_PLAYBOOKS.to_string())
                } else {
                    CallOutcome::ok(names.join(", "))
                }
            }
            MetaTool::ReadSkill => {
                let name = call.str_arg("name").unwrap_or_default();
                match &self.playbooks {
                    Some(store) => CallOutcome::ok(store.read_by_name(name)),
                    None => CallOutcome::ok(format!("Skill '{}' not found. Available: []", name)),
                }
            }
            MetaTool::WriteTest => {
                let filename = call.str_arg("filename").unwrap_or_default();
                let content = call.str_arg("content").unwrap_or_default();
                match &self.test_sink {
                    Some(sink) => CallOutcome::ok(sink.write(filename, content)),
                    None => CallOutcome::failed(
                        "Failed to write test: no test directory is configured".to_string(),
                    ),
                }
            }
        }
    }
}

/// Stops an owned actuator exactly once: inline through `stop`, or from `Drop` when the
/// run is cancelled before reaching it
struct StopGuard {
    actuator: Option<Arc<dyn Actuator>>,
}

impl StopGuard {
    fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator: Some(actuator),
        }
    }

    async fn stop(mut self) {
        if let Some(actuator) = self.actuator.take() {
            stop_actuator(actuator).await;
        }
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        let Some(actuator) = self.actuator.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("run cancelled, stopping actuator");
                handle.spawn(stop_actuator(actuator));
            }
            Err(_) => error!("run cancelled outside a runtime, actuator left running"),
        }
    }
}

async fn stop_actuator(actuator: Arc<dyn Actuator>) {
    let stopped = AssertUnwindSafe(actuator.stop()).catch_unwind().await;
    match stopped {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("Failed to stop actuator: {:#}", err),
        Err(panic) => warn!("Actuator panicked while stopping: {}", panic_message(&*panic)),
    }
}

/// Turn a panic inside `future` into an ordinary fault
async fn catch_panic<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow!("panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

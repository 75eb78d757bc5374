//! Full runs against fake backends and a fake site served by wiremock.
use serde_json::{json, Value};
use std::sync::Arc;
use web_automator::{
    actuator::{
        http::{HttpActuator, HttpActuatorFactory},
        Actuator, ActuatorSettings, ActuatorSource,
    },
    agent::{Agent, AgentConfig, Outcome},
    playbooks::DirectoryPlaybooks,
    providers::{
        anthropic::AnthropicProvider,
        configs::{AnthropicProviderConfig, OpenAiProviderConfig},
        openai::OpenAiProvider,
    },
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STORE: &str = r#"<html><head><title>Swag Labs</title></head>
<body><div class="inventory_item_price">$29.99</div></body></html>"#;

fn actuator_settings() -> ActuatorSettings {
    ActuatorSettings {
        upgrade_insecure: false,
        ..ActuatorSettings::default()
    }
}

async fn site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STORE, "text/html"))
        .mount(&server)
        .await;
    server
}

fn openai_tool_call(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn openai_provider(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiProviderConfig {
        host: server.uri(),
        api_key: "test".to_string(),
        model: "gpt-4o".to_string(),
        temperature: None,
        max_tokens: None,
    })
    .unwrap()
}

fn anthropic_provider(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(AnthropicProviderConfig {
        host: server.uri(),
        api_key: "test".to_string(),
        model: "claude-3-5-sonnet-latest".to_string(),
        temperature: None,
        max_tokens: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_openai_run_navigates_and_answers() {
    let site = site().await;
    let backend = MockServer::start().await;

    // once the navigate result is in the transcript, the model answers with done
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Navigated to"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            "call_2",
            "done",
            json!({"result": "$29.99"}),
        )))
        .with_priority(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            "call_1",
            "navigate",
            json!({"url": site.uri()}),
        )))
        .mount(&backend)
        .await;

    let agent = Agent::new(
        Box::new(openai_provider(&backend)),
        ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(actuator_settings()))),
    );

    let result = agent.run("What does the first item cost?").await;

    assert_eq!(result.outcome, Outcome::Completed, "{:?}", result);
    assert_eq!(result.result, "$29.99");
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].tool_name, "navigate");
    assert_eq!(result.steps[0].step_number, 1);
    assert!(result.steps[0].tool_result.contains("title='Swag Labs'"));
    assert_eq!(result.steps[1].step_number, 2);
}

#[tokio::test]
async fn test_anthropic_run_with_shared_actuator() {
    let site = site().await;
    let backend = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("tool_result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "The item costs $29.99"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 30, "output_tokens": 8}
        })))
        .with_priority(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Reading the page"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_page_content", "input": {}}
            ],
            "stop_reason": "tool_use"
        })))
        .mount(&backend)
        .await;

    let actuator = Arc::new(HttpActuator::new(actuator_settings()));
    actuator.start().await.unwrap();
    actuator
        .execute("navigate", json!({"url": site.uri()}).as_object().unwrap())
        .await
        .unwrap();

    let agent = Agent::new(
        Box::new(anthropic_provider(&backend)),
        ActuatorSource::Shared(actuator.clone()),
    );
    let result = agent.run("What does the first item cost?").await;

    assert_eq!(result.outcome, Outcome::Completed, "{:?}", result);
    assert_eq!(result.result, "The item costs $29.99");
    assert!(result.steps[0].tool_result.contains("$29.99"));

    // the caller's session survives the run
    let page = actuator
        .execute("get_page_content", &Default::default())
        .await
        .unwrap();
    assert!(page.succeeded());
}

#[tokio::test]
async fn test_backend_failure_is_reported() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&backend)
        .await;

    let agent = Agent::new(
        Box::new(openai_provider(&backend)),
        ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(actuator_settings()))),
    );
    let result = agent.run("Anything").await;

    assert_eq!(result.outcome, Outcome::Failed);
    assert!(!result.success);
    assert!(result.result.starts_with("Agent error: Server error: 500"));
}

#[tokio::test]
async fn test_budget_exhausted_against_backend() {
    let site = site().await;
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            "call_1",
            "navigate",
            json!({"url": site.uri()}),
        )))
        .mount(&backend)
        .await;

    let agent = Agent::new(
        Box::new(openai_provider(&backend)),
        ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(actuator_settings()))),
    )
    .with_config(AgentConfig {
        max_steps: 3,
        ..AgentConfig::default()
    });
    let result = agent.run("Loop forever").await;

    assert_eq!(result.outcome, Outcome::BudgetExhausted);
    assert_eq!(result.error.as_deref(), Some("max_steps_exceeded"));
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.steps[2].step_number, 3);
}

#[tokio::test]
async fn test_playbooks_are_offered_in_system_prompt() {
    let skills = tempfile::tempdir().unwrap();
    std::fs::write(skills.path().join("saucedemo.md"), "Log in as standard_user").unwrap();

    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("list_skills"))
        .and(body_string_contains("Skills are available"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ready"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let agent = Agent::new(
        Box::new(openai_provider(&backend)),
        ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(actuator_settings()))),
    )
    .with_playbooks(Arc::new(DirectoryPlaybooks::new(skills.path())));

    let result = agent.run("Log in").await;
    assert_eq!(result.result, "ready");
}

use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use web_automator::{
    agent::RunResult,
    providers::factory::{build_provider, UnknownProviderError},
};

#[derive(Debug, Deserialize)]
struct RunRequest {
    task: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

async fn run_task(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResult>, (StatusCode, Json<Value>)> {
    let provider = build_provider(
        &state.settings.provider,
        request.provider.as_deref(),
        request.model.as_deref(),
    )
    .map_err(|err| {
        warn!("could not build provider: {}", err);
        let status = if err.downcast_ref::<UnknownProviderError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({"detail": err.to_string()})))
    })?;

    info!("running task: {}", request.task);
    let result = state.agent(provider).run(&request.task).await;
    Ok(Json(result))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_task))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use web_automator::configuration::{ProviderSettings, Settings};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state(host: String) -> AppState {
        let mut settings = Settings::default();
        settings.provider = ProviderSettings::OpenAi {
            host,
            api_key: Some("test-key".to_string()),
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
        };
        AppState::new(settings)
    }

    fn post_run(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_provider_is_bad_request() {
        let response = routes(state("http://localhost".to_string()))
            .oneshot(post_run(json!({"task": "anything", "provider": "gemini"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Unknown provider: 'gemini'. Choose 'anthropic' or 'openai'."
        );
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Nothing to do"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&backend)
            .await;

        let response = routes(state(backend.uri()))
            .oneshot(post_run(json!({"task": "Say hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["result"], "Nothing to do");
        assert_eq!(value["success"], true);
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["steps"], json!([]));
        assert_eq!(value["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_backend_failure_is_a_failed_run() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&backend)
            .await;

        let response = routes(state(backend.uri()))
            .oneshot(post_run(json!({"task": "Say hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["success"], false);
        assert_eq!(value["outcome"], "failed");
    }
}

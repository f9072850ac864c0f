use aawo_core_lib::config::Config;
use aawo_core_lib::services::llm_client::{LlmClient, LlmPurpose};
use httpmock::prelude::*;
use serde_json::json;

fn base_config(base_url: String) -> Config {
    Config {
        timezone: "UTC".into(),
        database_path: None,
        llm_model: "test-model".into(),
        llm_fallback_model: None,
        llm_timeout_seconds: 10,
        llm_api_key: Some("sk-test".into()),
        llm_base_url: base_url,
        strict_llm: false,
        mirror_client_id: None,
        mirror_client_secret: None,
        mirror_scopes: None,
        mirror_base_url: None,
    }
}

fn chat_completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
    })
}

#[tokio::test]
async fn complete_json_parses_successful_response() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .json_body(chat_completion_body("{\"actions\":[],\"note\":null}"));
    });

    let config = base_config(server.base_url());
    let client = LlmClient::from_config(&config).unwrap().expect("api key configured");

    let invocation = client
        .complete_json(LlmPurpose::AssistantPlan, "system", &json!({"message": "hi"}))
        .await
        .unwrap();

    assert_eq!(invocation.content, json!({"actions": [], "note": null}));
    assert_eq!(invocation.model_used, "test-model");
    assert_eq!(invocation.tokens_used.get("total"), Some(&15));
    mock.assert();
}

#[tokio::test]
async fn complete_json_strips_markdown_fences_from_content() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .json_body(chat_completion_body("```json\n{\"note\":\"fenced\"}\n```"));
    });

    let config = base_config(server.base_url());
    let client = LlmClient::from_config(&config).unwrap().unwrap();

    let invocation = client
        .complete_json(LlmPurpose::Nli, "system", &json!({}))
        .await
        .unwrap();

    assert_eq!(invocation.content, json!({"note": "fenced"}));
}

#[tokio::test]
async fn complete_json_surfaces_auth_errors_without_retrying() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(401).body("invalid api key");
    });

    let config = base_config(server.base_url());
    let client = LlmClient::from_config(&config).unwrap().unwrap();

    let error = client
        .complete_json(LlmPurpose::AssistantPlan, "system", &json!({}))
        .await
        .unwrap_err();

    assert_eq!(error.code(), "UPSTREAM_AUTH");
    // a single non-retryable failure burns exactly one attempt
    mock.assert_hits(1);
}

#[tokio::test]
async fn complete_json_falls_through_to_fallback_model_on_persistent_error() {
    let server = MockServer::start();
    let primary = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains("\"model\":\"primary\"");
        then.status(404).body("model not found");
    });
    let fallback = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains("\"model\":\"fallback\"");
        then.status(200).json_body(chat_completion_body("{\"used\":\"fallback\"}"));
    });

    let mut config = base_config(server.base_url());
    config.llm_model = "primary".into();
    config.llm_fallback_model = Some("fallback".into());
    let client = LlmClient::from_config(&config).unwrap().unwrap();

    let invocation = client
        .complete_json(LlmPurpose::ActionItemExtraction, "system", &json!({}))
        .await
        .unwrap();

    assert_eq!(invocation.model_used, "fallback");
    primary.assert();
    fallback.assert();
}

#[tokio::test]
async fn complete_json_is_throttled_when_rate_limited() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(429).body("slow down");
    });

    let config = base_config(server.base_url());
    let client = LlmClient::from_config(&config).unwrap().unwrap();

    let error = client
        .complete_json(LlmPurpose::AssistantPlan, "system", &json!({}))
        .await
        .unwrap_err();

    assert_eq!(error.code(), "THROTTLED");
    // retryable: all four attempts of the backoff schedule are exhausted
    mock.assert_hits(4);
}

#[test]
fn from_config_requires_a_non_empty_api_key() {
    let config = base_config("https://example.invalid".into());
    let mut empty_key = config;
    empty_key.llm_api_key = Some("   ".into());
    assert!(LlmClient::from_config(&empty_key).unwrap().is_none());
}

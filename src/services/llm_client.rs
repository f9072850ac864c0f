use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult, UpstreamKind};
use crate::utils::redact::redact_sensitive_data;

/// Purposes the assistant drives a chat completion for. Each yields a
/// fixed JSON schema, enforced by the caller, never by this client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmPurpose {
    AssistantPlan,
    Nli,
    ActionItemExtraction,
}

impl LlmPurpose {
    fn as_str(self) -> &'static str {
        match self {
            LlmPurpose::AssistantPlan => "assistant_plan",
            LlmPurpose::Nli => "nli",
            LlmPurpose::ActionItemExtraction => "action_item_extraction",
        }
    }

    fn temperature(self) -> f32 {
        match self {
            LlmPurpose::AssistantPlan => 0.2,
            LlmPurpose::Nli => 0.0,
            LlmPurpose::ActionItemExtraction => 0.3,
        }
    }
}

pub struct LlmInvocation {
    pub content: JsonValue,
    pub tokens_used: HashMap<String, u64>,
    pub model_used: String,
    pub correlation_id: String,
}

/// JSON-only chat completion client with primary/fallback model candidates.
/// `None` from `from_config` means no usable API key is configured; callers
/// fall back to their deterministic path (or fail with UpstreamAuth in
/// strict-LLM mode).
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    models: Vec<String>,
}

struct AttemptFailure {
    error: AppError,
    retryable: bool,
    temperature_unsupported: bool,
}

impl LlmClient {
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let api_key = match &config.llm_api_key {
            Some(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.llm_timeout_seconds))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::internal(format!("failed to initialize LLM http client: {err}")))?;

        let base_url = config.llm_base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{base_url}/v1/chat/completions");

        let mut models = vec![config.llm_model.clone()];
        if let Some(fallback) = &config.llm_fallback_model {
            if !fallback.trim().is_empty() && fallback != &config.llm_model {
                models.push(fallback.clone());
            }
        }

        Ok(Some(Self {
            client,
            api_key,
            endpoint,
            models,
        }))
    }

    /// Tries the primary model, then each fallback in turn. A model whose
    /// error text indicates it rejects a custom temperature gets one retry
    /// without the `temperature` field before the client moves on.
    pub async fn complete_json(
        &self,
        purpose: LlmPurpose,
        system_prompt: &str,
        payload: &JsonValue,
    ) -> AppResult<LlmInvocation> {
        let sanitized = redact_sensitive_data(payload)
            .unwrap_or_else(|_| JsonValue::String("<redacted>".to_string()));
        let sanitized_str =
            serde_json::to_string(&sanitized).unwrap_or_else(|_| "\"<redacted>\"".to_string());

        let mut last_error: Option<AppError> = None;

        for model in &self.models {
            match self
                .invoke_model(purpose, system_prompt, payload, model, true, &sanitized_str)
                .await
            {
                Ok(invocation) => return Ok(invocation),
                Err(failure) if failure.temperature_unsupported => {
                    debug!(
                        target: "aawo::upstream",
                        model = %model,
                        "model rejected temperature field, retrying without it"
                    );
                    match self
                        .invoke_model(purpose, system_prompt, payload, model, false, &sanitized_str)
                        .await
                    {
                        Ok(invocation) => return Ok(invocation),
                        Err(retry_failure) => {
                            last_error = Some(retry_failure.error);
                            continue;
                        }
                    }
                }
                Err(failure) => {
                    last_error = Some(failure.error);
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::upstream_api(UpstreamKind::Llm, "no model candidates configured", None)
        }))
    }

    /// Per-model call with a bounded backoff budget of four attempts. A
    /// temperature-unsupported response is surfaced immediately (never
    /// retried within this loop) so the caller can do its one no-temperature
    /// retry before burning the budget on a request that will fail again.
    async fn invoke_model(
        &self,
        purpose: LlmPurpose,
        system_prompt: &str,
        payload: &JsonValue,
        model: &str,
        include_temperature: bool,
        sanitized_payload: &str,
    ) -> Result<LlmInvocation, AttemptFailure> {
        let correlation_id = Uuid::new_v4().to_string();
        let request_body =
            Self::build_request_body(model, purpose, system_prompt, payload, include_temperature);
        let backoff_schedule = [
            StdDuration::from_secs(0),
            StdDuration::from_secs(1),
            StdDuration::from_secs(2),
            StdDuration::from_secs(4),
        ];

        let mut last_failure: Option<AttemptFailure> = None;

        for (attempt, delay) in backoff_schedule.iter().enumerate() {
            if *delay > StdDuration::from_secs(0) {
                sleep(*delay).await;
            }

            debug!(
                target: "aawo::upstream",
                purpose = purpose.as_str(),
                model = %model,
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                payload = %sanitized_payload,
                "invoking llm"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let latency_ms = start.elapsed().as_millis();
                        let body: JsonValue = resp.json().await.map_err(|err| AttemptFailure {
                            error: AppError::upstream_api(
                                UpstreamKind::Llm,
                                format!("failed to parse llm response body: {err}"),
                                Some(status.as_u16()),
                            ),
                            retryable: false,
                            temperature_unsupported: false,
                        })?;

                        debug!(
                            target: "aawo::upstream",
                            correlation_id = %correlation_id,
                            latency_ms,
                            "llm responded"
                        );

                        let content = body
                            .pointer("/choices/0/message/content")
                            .and_then(|value| value.as_str())
                            .ok_or_else(|| AttemptFailure {
                                error: AppError::upstream_api(
                                    UpstreamKind::Llm,
                                    "llm response missing message content",
                                    Some(status.as_u16()),
                                ),
                                retryable: false,
                                temperature_unsupported: false,
                            })?;

                        let content_value =
                            Self::parse_content(content).map_err(|error| AttemptFailure {
                                error,
                                retryable: false,
                                temperature_unsupported: false,
                            })?;

                        return Ok(LlmInvocation {
                            content: content_value,
                            tokens_used: Self::extract_tokens(&body),
                            model_used: model.to_string(),
                            correlation_id,
                        });
                    }

                    let body_text = resp.text().await.unwrap_or_default();
                    if include_temperature && is_temperature_unsupported(&body_text) {
                        return Err(AttemptFailure {
                            error: AppError::upstream_api(
                                UpstreamKind::Llm,
                                format!("model {model} does not support a custom temperature"),
                                Some(status.as_u16()),
                            ),
                            retryable: false,
                            temperature_unsupported: true,
                        });
                    }

                    let failure = Self::map_http_error(status, &body_text);
                    if !failure.retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(failure);
                    }
                    last_failure = Some(failure);
                }
                Err(err) => {
                    let failure = Self::failure_from_reqwest(err);
                    if !failure.retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(failure);
                    }
                    last_failure = Some(failure);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| AttemptFailure {
            error: AppError::upstream_api(UpstreamKind::Llm, "llm request failed", None),
            retryable: false,
            temperature_unsupported: false,
        }))
    }

    fn build_request_body(
        model: &str,
        purpose: LlmPurpose,
        system_prompt: &str,
        payload: &JsonValue,
        include_temperature: bool,
    ) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        let mut body = json!({
            "model": model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content }
            ]
        });
        if include_temperature {
            body["temperature"] = json!(purpose.temperature());
        }
        body
    }

    fn parse_content(content: &str) -> AppResult<JsonValue> {
        let trimmed = content.trim();
        let cleaned = if trimmed.starts_with("```") {
            let without_prefix = trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```JSON")
                .trim_start_matches("```");
            without_prefix.trim_end_matches("```").trim().to_string()
        } else {
            trimmed.to_string()
        };

        serde_json::from_str(&cleaned)
            .map_err(|err| AppError::upstream_api(UpstreamKind::Llm, format!("llm response is not valid json: {err}"), None))
    }

    fn extract_tokens(body: &JsonValue) -> HashMap<String, u64> {
        let mut tokens = HashMap::new();
        if let Some(usage) = body.get("usage") {
            if let Some(value) = usage.get("prompt_tokens").and_then(|v| v.as_u64()) {
                tokens.insert("prompt".to_string(), value);
            }
            if let Some(value) = usage.get("completion_tokens").and_then(|v| v.as_u64()) {
                tokens.insert("completion".to_string(), value);
            }
            if let Some(value) = usage.get("total_tokens").and_then(|v| v.as_u64()) {
                tokens.insert("total".to_string(), value);
            }
        }
        tokens
    }

    fn map_http_error(status: StatusCode, body_text: &str) -> AttemptFailure {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AttemptFailure {
                error: AppError::upstream_auth(UpstreamKind::Llm, "llm api key invalid or unauthorized"),
                retryable: false,
                temperature_unsupported: false,
            },
            StatusCode::TOO_MANY_REQUESTS => AttemptFailure {
                error: AppError::throttled(UpstreamKind::Llm, "llm request throttled"),
                retryable: true,
                temperature_unsupported: false,
            },
            status if status.is_server_error() => AttemptFailure {
                error: AppError::upstream_api(
                    UpstreamKind::Llm,
                    format!("llm service unavailable (status {})", status.as_u16()),
                    Some(status.as_u16()),
                ),
                retryable: true,
                temperature_unsupported: false,
            },
            status => AttemptFailure {
                error: AppError::upstream_api(
                    UpstreamKind::Llm,
                    format!("llm returned error status {}: {}", status.as_u16(), body_text),
                    Some(status.as_u16()),
                ),
                retryable: false,
                temperature_unsupported: false,
            },
        }
    }

    fn failure_from_reqwest(err: reqwest::Error) -> AttemptFailure {
        if err.is_timeout() {
            AttemptFailure {
                error: AppError::upstream_api(UpstreamKind::Llm, "llm request timed out", None),
                retryable: true,
                temperature_unsupported: false,
            }
        } else if err.is_connect() {
            AttemptFailure {
                error: AppError::upstream_api(UpstreamKind::Llm, "llm connection failed", None),
                retryable: true,
                temperature_unsupported: false,
            }
        } else {
            AttemptFailure {
                error: AppError::upstream_api(UpstreamKind::Llm, format!("llm request error: {err}"), None),
                retryable: false,
                temperature_unsupported: false,
            }
        }
    }
}

fn is_temperature_unsupported(body_text: &str) -> bool {
    let lower = body_text.to_lowercase();
    lower.contains("temperature")
        && (lower.contains("unsupported value") || lower.contains("does not support"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_temperature_unsupported_messages() {
        assert!(is_temperature_unsupported(
            "{\"error\":{\"message\":\"Unsupported value: 'temperature' does not support 0.2 with this model.\"}}"
        ));
        assert!(is_temperature_unsupported(
            "this model does not support the temperature parameter"
        ));
    }

    #[test]
    fn ignores_unrelated_error_bodies() {
        assert!(!is_temperature_unsupported("{\"error\":{\"message\":\"invalid api key\"}}"));
    }

    #[test]
    fn parse_content_strips_markdown_fences() {
        let raw = "```json\n{\"title\":\"x\"}\n```";
        let value = LlmClient::parse_content(raw).unwrap();
        assert_eq!(value["title"], "x");
    }

    #[test]
    fn from_config_returns_none_without_api_key() {
        let config = Config {
            timezone: "UTC".into(),
            database_path: None,
            llm_model: "deepseek-chat".into(),
            llm_fallback_model: None,
            llm_timeout_seconds: 30,
            llm_api_key: None,
            llm_base_url: "https://api.deepseek.com".into(),
            strict_llm: false,
            mirror_client_id: None,
            mirror_client_secret: None,
            mirror_scopes: None,
            mirror_base_url: None,
        };
        assert!(LlmClient::from_config(&config).unwrap().is_none());
    }
}

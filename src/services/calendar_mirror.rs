use std::time::Duration as StdDuration;

use reqwest::StatusCode;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, UpstreamKind};
use crate::models::calendar_block::CalendarBlock;

#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorPushOutcome {
    pub created: i64,
    pub updated: i64,
    pub skipped: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorDeleteOutcome {
    pub deleted: i64,
    pub failed: i64,
}

/// One-way reflector of local `aawo`-sourced blocks onto an external
/// calendar. `None` from `from_config` means no mirror credentials are
/// configured; Executor treats that the same as a disconnected mirror.
pub struct CalendarMirror {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl CalendarMirror {
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let (client_id, client_secret, base_url) = match (
            &config.mirror_client_id,
            &config.mirror_client_secret,
            &config.mirror_base_url,
        ) {
            (Some(id), Some(secret), Some(url))
                if !id.trim().is_empty() && !secret.trim().is_empty() =>
            {
                (id.clone(), secret.clone(), url.trim_end_matches('/').to_string())
            }
            _ => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(20))
            .build()
            .map_err(|err| AppError::internal(format!("failed to initialize mirror http client: {err}")))?;

        Ok(Some(Self {
            client,
            base_url,
            client_id,
            client_secret,
        }))
    }

    pub fn is_connected(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Pushes every non-external block. Each push uses a deterministic
    /// transaction id derived from the block id so a retried push is safely
    /// idempotent on the remote side.
    pub async fn mirror(&self, blocks: &[CalendarBlock]) -> AppResult<MirrorPushOutcome> {
        let mut outcome = MirrorPushOutcome::default();
        for block in blocks {
            if block.is_external() {
                outcome.skipped += 1;
                continue;
            }

            let transaction_id = transaction_id_for(&block.id);
            let body = json!({
                "transactionId": transaction_id,
                "title": block.title,
                "start": block.start.to_rfc3339(),
                "end": block.end.to_rfc3339(),
            });

            match self.request_with_backoff(reqwest::Method::PUT, &format!("/events/{transaction_id}"), &body).await {
                Ok(_) => {
                    if block.external_event_id.is_some() {
                        outcome.updated += 1;
                    } else {
                        outcome.created += 1;
                    }
                }
                Err(error) => {
                    warn!(target: "aawo::upstream", kind = "mirror", block_id = %block.id, error = %error, "mirror push failed, non-fatal");
                    outcome.skipped += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Deletes every non-external block remotely. Unlike `mirror`, failures
    /// here are surfaced to the caller: a failed remote delete must never be
    /// silently treated as success, or the local delete would orphan the
    /// remote copy.
    pub async fn delete(&self, blocks: &[CalendarBlock]) -> AppResult<MirrorDeleteOutcome> {
        let mut outcome = MirrorDeleteOutcome::default();
        let mut last_error = None;
        for block in blocks {
            if block.is_external() {
                continue;
            }
            let transaction_id = transaction_id_for(&block.id);
            match self
                .request_with_backoff(reqwest::Method::DELETE, &format!("/events/{transaction_id}"), &json!({}))
                .await
            {
                Ok(_) => outcome.deleted += 1,
                Err(error) => {
                    outcome.failed += 1;
                    last_error = Some(error);
                }
            }
        }
        if outcome.failed > 0 {
            return Err(last_error.unwrap_or_else(|| {
                AppError::upstream_api(UpstreamKind::Mirror, "mirror delete failed", None)
            }));
        }
        Ok(outcome)
    }

    async fn request_with_backoff(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> AppResult<()> {
        let url = format!("{}{path}", self.base_url);
        let backoff_schedule = [
            StdDuration::from_secs(0),
            StdDuration::from_secs(1),
            StdDuration::from_secs(2),
            StdDuration::from_secs(4),
        ];

        let mut last_error: Option<AppError> = None;
        for (attempt, delay) in backoff_schedule.iter().enumerate() {
            if *delay > StdDuration::from_secs(0) {
                sleep(*delay).await;
            }

            debug!(target: "aawo::upstream", kind = "mirror", attempt = attempt + 1, %url, "calling mirror");

            let response = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.client_secret)
                .json(body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    let (error, retryable) = Self::map_http_error(status, &text);
                    if !retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect();
                    let error = AppError::upstream_api(UpstreamKind::Mirror, format!("mirror request error: {err}"), None);
                    if !retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::upstream_api(UpstreamKind::Mirror, "mirror request failed", None)))
    }

    fn map_http_error(status: StatusCode, body_text: &str) -> (AppError, bool) {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => (
                AppError::upstream_auth(UpstreamKind::Mirror, "mirror credentials invalid or unauthorized"),
                false,
            ),
            StatusCode::TOO_MANY_REQUESTS => (
                AppError::throttled(UpstreamKind::Mirror, "mirror request throttled"),
                true,
            ),
            status if status.is_server_error() => (
                AppError::upstream_api(UpstreamKind::Mirror, format!("mirror service unavailable (status {})", status.as_u16()), Some(status.as_u16())),
                true,
            ),
            status => (
                AppError::upstream_api(UpstreamKind::Mirror, format!("mirror returned error status {}: {}", status.as_u16(), body_text), Some(status.as_u16())),
                false,
            ),
        }
    }
}

fn transaction_id_for(block_id: &str) -> String {
    use base64::Engine;
    let mut hasher = Sha256::new();
    hasher.update(block_id.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_is_deterministic() {
        assert_eq!(transaction_id_for("block-1"), transaction_id_for("block-1"));
        assert_ne!(transaction_id_for("block-1"), transaction_id_for("block-2"));
    }

    #[test]
    fn from_config_returns_none_without_credentials() {
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
        assert!(CalendarMirror::from_config(&config).unwrap().is_none());
    }
}

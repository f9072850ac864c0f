use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Process-wide configuration, parsed once at startup from the environment.
/// Invalid values fail startup loudly rather than silently defaulting.
#[derive(Debug, Clone)]
pub struct Config {
    pub timezone: String,
    pub database_path: Option<PathBuf>,
    pub llm_model: String,
    pub llm_fallback_model: Option<String>,
    pub llm_timeout_seconds: u64,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub strict_llm: bool,
    pub mirror_client_id: Option<String>,
    pub mirror_client_secret: Option<String>,
    pub mirror_scopes: Option<String>,
    pub mirror_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let timezone = env_or("AAWO_TIMEZONE", "UTC");
        let database_path = std::env::var("AAWO_DATABASE_PATH").ok().map(PathBuf::from);
        let llm_model = env_or("AAWO_LLM_MODEL", "deepseek-chat");
        let llm_fallback_model = std::env::var("AAWO_LLM_FALLBACK_MODEL").ok().filter(|v| !v.trim().is_empty());
        let llm_timeout_seconds = parse_env("AAWO_LLM_TIMEOUT_SECONDS", 30u64)?;
        let llm_api_key = std::env::var("AAWO_LLM_API_KEY").ok().filter(|v| !v.trim().is_empty());
        let llm_base_url = env_or("AAWO_LLM_BASE_URL", "https://api.deepseek.com");
        let strict_llm = parse_bool_env("AAWO_STRICT_LLM", false)?;
        let mirror_client_id = std::env::var("AAWO_MIRROR_CLIENT_ID").ok();
        let mirror_client_secret = std::env::var("AAWO_MIRROR_CLIENT_SECRET").ok();
        let mirror_scopes = std::env::var("AAWO_MIRROR_SCOPES").ok();
        let mirror_base_url = std::env::var("AAWO_MIRROR_BASE_URL").ok();

        Ok(Self {
            timezone,
            database_path,
            llm_model,
            llm_fallback_model,
            llm_timeout_seconds,
            llm_api_key,
            llm_base_url,
            strict_llm,
            mirror_client_id,
            mirror_client_secret,
            mirror_scopes,
            mirror_base_url,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env(key: &str, default: u64) -> AppResult<u64> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::validation(format!("{key} must be a positive integer, got {raw:?}"))),
        _ => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AppError::validation(format!("{key} must be a boolean, got {raw:?}"))),
        },
        _ => Ok(default),
    }
}

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

/// Upstream failure classification, carried on `AppError::UpstreamAuth` /
/// `UpstreamApi` so command-boundary conversion can pick a stable code
/// without re-deriving it from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Llm,
    Mirror,
}

impl UpstreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamKind::Llm => "llm",
            UpstreamKind::Mirror => "mirror",
        }
    }
}

impl std::fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("{kind} authentication failed: {message}")]
    UpstreamAuth {
        kind: UpstreamKind,
        message: String,
    },

    #[error("{kind} request failed: {message}")]
    UpstreamApi {
        kind: UpstreamKind,
        message: String,
        status: Option<u16>,
    },

    #[error("throttled by {kind}: {message}")]
    Throttled { kind: UpstreamKind, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "aawo::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "aawo::validation", %message, %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "aawo::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "aawo::not_found", %message, "resource not found");
        AppError::NotFound { message }
    }

    pub fn upstream_auth(kind: UpstreamKind, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "aawo::upstream", kind = kind.as_str(), %message, "upstream auth failure");
        AppError::UpstreamAuth { kind, message }
    }

    pub fn upstream_api(
        kind: UpstreamKind,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        let message = message.into();
        error!(target: "aawo::upstream", kind = kind.as_str(), status, %message, "upstream api failure");
        AppError::UpstreamApi {
            kind,
            message,
            status,
        }
    }

    pub fn throttled(kind: UpstreamKind, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "aawo::upstream", kind = kind.as_str(), %message, "throttled");
        AppError::Throttled { kind, message }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "aawo::internal", %message, "internal error");
        AppError::Internal(message)
    }

    /// Stable code for the command boundary / HTTP-status-equivalent mapping (SPEC_FULL.md §6).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::UpstreamAuth { .. } => "UPSTREAM_AUTH",
            AppError::UpstreamApi { .. } => "UPSTREAM_API",
            AppError::Throttled { .. } => "THROTTLED",
            AppError::Internal(_) => "INTERNAL",
            AppError::Serialization(_) => "INTERNAL",
            AppError::Io(_) => "INTERNAL",
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found("record not found"),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("constraint violation")
            }
            _ => {
                error!(target: "aawo::database", error = ?error, "sqlite error");
                AppError::internal(error.to_string())
            }
        }
    }
}

pub mod approvals;
pub mod assistant;
pub mod briefings;
pub mod calendar;
pub mod meetings;
pub mod profile;
pub mod scheduling;
pub mod sync;
pub mod task;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::services::calendar_mirror::CalendarMirror;
use crate::services::llm_client::LlmClient;
use crate::services::profile_service::ProfileService;
use crate::services::task_service::TaskService;

/// Process-wide handle shared across Tauri command invocations. Stateless
/// services (`Scheduler`, `ProposalApplier`, `Planner`, `Executor`,
/// `ApprovalStateMachine`, `MeetingExtractor`) take a connection directly at
/// the call site and so need no slot here.
#[derive(Clone)]
pub struct AppState {
    db: DbPool,
    tasks: TaskService,
    profiles: ProfileService,
    llm: Option<LlmClient>,
    mirror: Option<CalendarMirror>,
    strict_llm: bool,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Result<Self, AppError> {
        let tasks = TaskService::new(db.clone());
        let profiles = ProfileService::new(db.clone());
        let llm = LlmClient::from_config(config)?;
        let mirror = CalendarMirror::from_config(config)?;
        if llm.is_none() && config.strict_llm {
            warn!(target: "aawo::startup", "strict_llm is enabled but no llm credentials were configured");
        }
        Ok(Self {
            db,
            tasks,
            profiles,
            llm,
            mirror,
            strict_llm: config.strict_llm,
        })
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    pub fn llm(&self) -> Option<&LlmClient> {
        self.llm.as_ref()
    }

    pub fn mirror(&self) -> Option<&CalendarMirror> {
        self.mirror.as_ref()
    }

    pub fn strict_llm(&self) -> bool {
        self.strict_llm
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Option<JsonValue>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        let code = error.code().to_string();
        match &error {
            AppError::Validation { message, details } => {
                CommandError::new(code, message.clone(), details.clone())
            }
            AppError::Conflict { message } | AppError::NotFound { message } => {
                CommandError::new(code, message.clone(), None)
            }
            AppError::UpstreamAuth { kind, message } | AppError::Throttled { kind, message } => {
                CommandError::new(code, message.clone(), Some(serde_json::json!({"upstream": kind.as_str()})))
            }
            AppError::UpstreamApi { kind, message, status } => CommandError::new(
                code,
                message.clone(),
                Some(serde_json::json!({"upstream": kind.as_str(), "status": status})),
            ),
            AppError::Internal(message) => CommandError::new(code, message.clone(), None),
            AppError::Serialization(source) => CommandError::new(code, source.to_string(), None),
            AppError::Io(source) => CommandError::new(code, source.to_string(), None),
        }
    }
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tauri::State;

use crate::db::repositories::approval_repository::ApprovalRepository;
use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::db::repositories::profile_repository::ProfileRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::models::action::{ChatTurn, Plan};
use crate::services::approval_state_machine::ApprovalStateMachine;
use crate::services::executor::{ExecutionOutcome, Executor};
use crate::services::planner::{Planner, WorldSnapshot};

use super::{AppState, CommandError, CommandResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatActionDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub actions: Vec<ChatActionDetail>,
    pub refresh: Vec<String>,
}

impl From<ExecutionOutcome> for ChatResponse {
    fn from(outcome: ExecutionOutcome) -> Self {
        ChatResponse {
            reply: outcome.reply,
            actions: Vec::new(),
            refresh: outcome.refresh,
        }
    }
}

/// The single conversational entry point (§6): resolves a bare chat
/// affirmative/negative against the latest pending approval first, else
/// plans and executes every action the turn resolves to.
#[tauri::command]
pub async fn assistant_chat(state: State<'_, AppState>, request: ChatRequest) -> CommandResult<ChatResponse> {
    let state = state.inner().clone();
    let now = Utc::now();
    let mut conn = state.db().get_connection().map_err(CommandError::from)?;
    let profile = ProfileRepository::get_or_create(&conn).map_err(CommandError::from)?;

    if let Some(outcome) = ApprovalStateMachine::resolve_from_chat(
        &mut conn,
        state.llm(),
        state.mirror(),
        &profile,
        &request.message,
        now,
    )
    .await
    .map_err(CommandError::from)?
    {
        return Ok(outcome.into());
    }

    let tasks = TaskRepository::list_non_terminal(&conn).map_err(CommandError::from)?;
    let blocks = CalendarBlockRepository::list_future_non_external(&conn, now).map_err(CommandError::from)?;
    let approvals = ApprovalRepository::list_pending(&conn).map_err(CommandError::from)?;
    let snapshot = WorldSnapshot {
        tasks: &tasks,
        blocks: &blocks,
        approvals: &approvals,
    };

    let plan = Planner::plan(state.llm(), &request.message, &request.history, &snapshot, state.strict_llm(), now)
        .await
        .map_err(CommandError::from)?;

    ApprovalStateMachine::supersede_clarification_if_needed(&conn, &plan).map_err(CommandError::from)?;

    let mut replies = Vec::new();
    let mut refresh = std::collections::BTreeSet::new();
    let mut actions = Vec::new();
    for action in plan.actions {
        let detail = format!("{:?}", action);
        let intent = action.intent_name().to_string();
        let outcome = Executor::execute(
            &mut conn,
            state.llm(),
            state.mirror(),
            &profile,
            action,
            &request.message,
            &request.history,
            now,
        )
        .await
        .map_err(CommandError::from)?;
        refresh.extend(outcome.refresh);
        replies.push(outcome.reply);
        actions.push(ChatActionDetail { kind: intent, detail });
    }
    if let Some(note) = plan.note {
        replies.push(note);
    }

    Ok(ChatResponse {
        reply: replies.join(" "),
        actions,
        refresh: refresh.into_iter().collect(),
    })
}

/// Preview-only classification (§6 `nli/command`): returns the Planner's
/// typed interpretation of a message without dispatching any handler.
#[tauri::command]
pub async fn nli_command(state: State<'_, AppState>, request: ChatRequest) -> CommandResult<Plan> {
    let state = state.inner().clone();
    let now = Utc::now();
    let conn = state.db().get_connection().map_err(CommandError::from)?;

    let tasks = TaskRepository::list_non_terminal(&conn).map_err(CommandError::from)?;
    let blocks = CalendarBlockRepository::list_future_non_external(&conn, now).map_err(CommandError::from)?;
    let approvals = ApprovalRepository::list_pending(&conn).map_err(CommandError::from)?;
    let snapshot = WorldSnapshot {
        tasks: &tasks,
        blocks: &blocks,
        approvals: &approvals,
    };

    Planner::plan(state.llm(), &request.message, &request.history, &snapshot, state.strict_llm(), now)
        .await
        .map_err(CommandError::from)
}

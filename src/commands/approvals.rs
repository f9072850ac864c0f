use serde::Deserialize;
use tauri::State;

use crate::db::repositories::approval_repository::ApprovalRepository;
use crate::models::approval::{ApprovalDecision, ApprovalRequest};
use crate::services::approval_state_machine::ApprovalStateMachine;

use super::{AppState, CommandResult};

#[tauri::command]
pub async fn approvals_list(state: State<'_, AppState>) -> CommandResult<Vec<ApprovalRequest>> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(ApprovalRepository::list_pending)).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResolution {
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[tauri::command]
pub async fn approvals_resolve(
    state: State<'_, AppState>,
    id: String,
    payload: ApprovalResolution,
) -> CommandResult<ApprovalRequest> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        let decision = if payload.approve {
            ApprovalDecision::Approve
        } else {
            ApprovalDecision::Reject
        };
        state.db().with_connection(|conn| {
            ApprovalStateMachine::resolve_explicit(conn, &id, decision, payload.reason.as_deref())
        })
    })
    .await
}

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tauri::State;

use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::db::repositories::profile_repository::ProfileRepository;
use crate::db::repositories::proposal_repository::ProposalRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::models::proposal::{ApplyOutcome, SchedulingProposal};
use crate::services::proposal_applier::ProposalApplier;
use crate::services::scheduler::Scheduler;

use super::{AppState, CommandResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateProposalsInput {
    pub horizon_start: DateTime<Utc>,
    pub horizon_end: DateTime<Utc>,
    pub slot_minutes: i64,
    pub max_proposals: i64,
}

#[tauri::command]
pub async fn scheduling_proposals_generate(
    state: State<'_, AppState>,
    payload: GenerateProposalsInput,
) -> CommandResult<Vec<SchedulingProposal>> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection_mut(|conn| {
            let profile = ProfileRepository::get_or_create(conn)?;
            let candidates = TaskRepository::list_non_terminal(conn)?;
            let existing_blocks = CalendarBlockRepository::list_intersecting(conn, payload.horizon_start, payload.horizon_end)?;

            let proposals = Scheduler::generate(
                &profile,
                payload.horizon_start,
                payload.horizon_end,
                candidates,
                &existing_blocks,
                payload.slot_minutes,
                payload.max_proposals,
            )?;

            for proposal in &proposals {
                ProposalRepository::insert_with_changes(conn, proposal)?;
            }
            Ok(proposals)
        })
    })
    .await
}

#[tauri::command]
pub async fn scheduling_proposals_list(state: State<'_, AppState>, limit: i64) -> CommandResult<Vec<SchedulingProposal>> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(|conn| ProposalRepository::list_recent(conn, limit))).await
}

#[tauri::command]
pub async fn scheduling_proposals_get(state: State<'_, AppState>, id: String) -> CommandResult<SchedulingProposal> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(|conn| ProposalRepository::find_by_id(conn, &id))).await
}

#[tauri::command]
pub async fn scheduling_proposals_apply(state: State<'_, AppState>, id: String) -> CommandResult<ApplyOutcome> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(|conn| ProposalApplier::apply(conn, &id))).await
}

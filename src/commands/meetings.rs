use chrono::Utc;
use serde_json::json;
use tauri::State;
use uuid::Uuid;

use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::meeting_repository::{ActionItemCandidateRepository, MeetingRepository};
use crate::db::repositories::task_repository::TaskRepository;
use crate::error::AppError;
use crate::models::meeting::{is_auto_approvable, ActionItemCandidate, Meeting, MeetingIngestInput};
use crate::models::task::Task;
use crate::services::meeting_extractor::MeetingExtractor;

use super::{AppState, CommandError, CommandResult};

#[tauri::command]
pub async fn meetings_get(state: State<'_, AppState>, id: String) -> CommandResult<Meeting> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(|conn| MeetingRepository::find_by_id(conn, &id))).await
}

/// Persists a transcript, runs extraction, and either auto-creates a Task for
/// each confident-and-small candidate or leaves it `pending` for manual
/// approval via `action_items_approve` (§4.6).
#[tauri::command]
pub async fn meetings_ingest(state: State<'_, AppState>, payload: MeetingIngestInput) -> CommandResult<Meeting> {
    let state = state.inner().clone();
    let now = Utc::now();

    let meeting = Meeting {
        id: Uuid::new_v4().to_string(),
        title: payload.title,
        started_at: payload.started_at,
        ended_at: payload.ended_at,
        summary: payload.summary,
        transcript: payload.transcript,
        extraction_status: "pending".to_string(),
        created_at: now,
        updated_at: now,
    };

    let conn = state.db().get_connection().map_err(CommandError::from)?;
    MeetingRepository::insert(&conn, &meeting).map_err(CommandError::from)?;

    let drafts = MeetingExtractor::extract(state.llm(), &meeting, now).await;

    for draft in drafts {
        let candidate = ActionItemCandidate {
            id: Uuid::new_v4().to_string(),
            meeting_id: meeting.id.clone(),
            title: draft.title,
            assignee_name: draft.assignee_name,
            due: draft.due,
            effort_minutes: draft.effort_minutes,
            confidence: draft.confidence,
            rationale: Some(draft.rationale),
            status: "pending".to_string(),
            linked_task_id: None,
            created_at: now,
            updated_at: now,
        };
        ActionItemCandidateRepository::insert(&conn, &candidate).map_err(CommandError::from)?;

        if is_auto_approvable(candidate.confidence, candidate.effort_minutes) {
            auto_create_task(&conn, &candidate, now).map_err(CommandError::from)?;
        }
    }

    MeetingRepository::update_extraction_status(&conn, &meeting.id, "completed").map_err(CommandError::from)?;
    AuditRepository::record(&conn, "ingest_meeting", "user", Some(&meeting.id), &json!({})).map_err(CommandError::from)?;

    MeetingRepository::find_by_id(&conn, &meeting.id).map_err(CommandError::from)
}

#[tauri::command]
pub async fn action_items_list(state: State<'_, AppState>, meeting_id: String) -> CommandResult<Vec<ActionItemCandidate>> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection(|conn| ActionItemCandidateRepository::list_by_meeting(conn, &meeting_id))
    })
    .await
}

#[tauri::command]
pub async fn action_items_approve(state: State<'_, AppState>, id: String) -> CommandResult<Task> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection_mut(|conn| {
            let candidate = ActionItemCandidateRepository::find_by_id(conn, &id)?;
            if candidate.status != "pending" {
                return Err(AppError::conflict(format!("action item {id} is not pending")));
            }
            let now = Utc::now();
            let task = Task {
                id: Uuid::new_v4().to_string(),
                title: candidate.title.clone(),
                description: candidate.rationale.clone(),
                status: "todo".to_string(),
                priority: "medium".to_string(),
                due: candidate.due,
                effort_minutes: candidate.effort_minutes,
                project_id: None,
                source: "meeting".to_string(),
                source_ref: Some(candidate.meeting_id.clone()),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            TaskRepository::insert(conn, &task)?;
            ActionItemCandidateRepository::update_status_and_link(conn, &id, "approved", Some(&task.id))?;
            AuditRepository::record(conn, "approve_action_item", "user", Some(&id), &json!({}))?;
            Ok(task)
        })
    })
    .await
}

#[tauri::command]
pub async fn action_items_reject(state: State<'_, AppState>, id: String) -> CommandResult<()> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection(|conn| {
            let candidate = ActionItemCandidateRepository::find_by_id(conn, &id)?;
            if candidate.status != "pending" {
                return Err(AppError::conflict(format!("action item {id} is not pending")));
            }
            ActionItemCandidateRepository::update_status_and_link(conn, &id, "rejected", None)?;
            AuditRepository::record(conn, "reject_action_item", "user", Some(&id), &json!({}))
        })
    })
    .await
}

fn auto_create_task(
    conn: &rusqlite::Connection,
    candidate: &ActionItemCandidate,
    now: chrono::DateTime<Utc>,
) -> crate::error::AppResult<()> {
    let task = Task {
        id: Uuid::new_v4().to_string(),
        title: candidate.title.clone(),
        description: candidate.rationale.clone(),
        status: "todo".to_string(),
        priority: "medium".to_string(),
        due: candidate.due,
        effort_minutes: candidate.effort_minutes,
        project_id: None,
        source: "meeting".to_string(),
        source_ref: Some(candidate.meeting_id.clone()),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    TaskRepository::insert(conn, &task)?;
    ActionItemCandidateRepository::update_status_and_link(conn, &candidate.id, "approved", Some(&task.id))?;
    AuditRepository::record(conn, "auto_approve_action_item", "system", Some(&candidate.id), &json!({}))
}

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tauri::State;
use tracing::warn;
use uuid::Uuid;

use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::error::AppError;
use crate::models::calendar_block::{CalendarBlock, CalendarBlockCreateInput, SOURCE_AAWO};

use super::{AppState, CommandResult};

#[tauri::command]
pub async fn calendar_blocks_list(
    state: State<'_, AppState>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> CommandResult<Vec<CalendarBlock>> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection(|conn| CalendarBlockRepository::list_intersecting(conn, from, to))
    })
    .await
}

#[tauri::command]
pub async fn calendar_blocks_create(
    state: State<'_, AppState>,
    payload: CalendarBlockCreateInput,
) -> CommandResult<CalendarBlock> {
    if payload.end <= payload.start {
        return Err(AppError::validation("block end must be after start").into());
    }
    let state = state.inner().clone();
    let conn = state.db().get_connection().map_err(super::CommandError::from)?;

    let conflicts = CalendarBlockRepository::list_intersecting(&conn, payload.start, payload.end)
        .map_err(super::CommandError::from)?;
    if conflicts.iter().any(|other| !other.is_external()) {
        return Err(AppError::conflict("block overlaps an existing calendar block").into());
    }

    let now = Utc::now();
    let block = CalendarBlock {
        id: Uuid::new_v4().to_string(),
        kind: payload.kind,
        title: payload.title,
        start: payload.start,
        end: payload.end,
        task_id: payload.task_id,
        locked: payload.locked,
        source: SOURCE_AAWO.to_string(),
        external_event_id: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    CalendarBlockRepository::insert(&conn, &block).map_err(super::CommandError::from)?;
    AuditRepository::record(&conn, "create_block", "user", Some(&block.id), &json!({"title": block.title}))
        .map_err(super::CommandError::from)?;

    if let Some(mirror) = state.mirror() {
        if mirror.is_connected() {
            if let Err(error) = mirror.mirror(std::slice::from_ref(&block)).await {
                warn!(target: "aawo::upstream", kind = "mirror", %error, "mirror push failed on create, non-fatal");
            }
        }
    }
    Ok(block)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBlockUpdate {
    pub title: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub locked: Option<bool>,
}

#[tauri::command]
pub async fn calendar_blocks_update(
    state: State<'_, AppState>,
    id: String,
    payload: CalendarBlockUpdate,
) -> CommandResult<CalendarBlock> {
    let state = state.inner().clone();
    let conn = state.db().get_connection().map_err(super::CommandError::from)?;

    let mut block = CalendarBlockRepository::find_by_id(&conn, &id).map_err(super::CommandError::from)?;
    if let Some(title) = payload.title {
        block.title = title;
    }
    if let Some(start) = payload.start {
        block.start = start;
    }
    if let Some(end) = payload.end {
        block.end = end;
    }
    if let Some(locked) = payload.locked {
        block.locked = locked;
    }
    if block.end <= block.start {
        return Err(AppError::validation("block end must be after start").into());
    }

    let conflicts = CalendarBlockRepository::list_intersecting(&conn, block.start, block.end)
        .map_err(super::CommandError::from)?;
    let overlaps_local = conflicts
        .iter()
        .any(|other| other.id != block.id && !other.is_external() && !block.is_external());
    if overlaps_local {
        return Err(AppError::conflict("block overlaps an existing calendar block").into());
    }

    block.version += 1;
    block.updated_at = Utc::now();
    CalendarBlockRepository::update(&conn, &block).map_err(super::CommandError::from)?;
    AuditRepository::record(&conn, "update_block", "user", Some(&block.id), &json!({})).map_err(super::CommandError::from)?;

    if let Some(mirror) = state.mirror() {
        if mirror.is_connected() {
            if let Err(error) = mirror.mirror(std::slice::from_ref(&block)).await {
                warn!(target: "aawo::upstream", kind = "mirror", %error, "mirror push failed on update, non-fatal");
            }
        }
    }
    Ok(block)
}

#[tauri::command]
pub async fn calendar_blocks_delete(state: State<'_, AppState>, id: String) -> CommandResult<()> {
    let state = state.inner().clone();
    let conn = state.db().get_connection().map_err(super::CommandError::from)?;
    let block = CalendarBlockRepository::find_by_id(&conn, &id).map_err(super::CommandError::from)?;

    if block.external_event_id.is_some() {
        match state.mirror() {
            Some(mirror) if mirror.is_connected() => {
                mirror.delete(std::slice::from_ref(&block)).await.map_err(super::CommandError::from)?;
            }
            _ => {
                return Err(AppError::conflict(
                    "cannot delete a mirrored block while the mirror is disconnected",
                )
                .into())
            }
        }
    }
    CalendarBlockRepository::delete(&conn, &id).map_err(super::CommandError::from)?;
    AuditRepository::record(&conn, "delete_block", "user", Some(&id), &json!({})).map_err(super::CommandError::from)?;
    Ok(())
}

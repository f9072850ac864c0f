use tauri::State;

use crate::db::repositories::sync_status_repository::SyncStatusRepository;
use crate::models::sync_status::SyncStatus;

use super::{AppState, CommandResult};

#[tauri::command]
pub async fn sync_status_get(state: State<'_, AppState>) -> CommandResult<SyncStatus> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.db().with_connection(SyncStatusRepository::get)).await
}

use std::collections::BTreeSet;

use tauri::{async_runtime, State};

use crate::error::AppError;
use crate::models::task::{Task, TaskCreateInput, TaskUpdateInput};

use super::{AppState, CommandError, CommandResult};

#[tauri::command]
pub async fn tasks_list(state: State<'_, AppState>) -> CommandResult<Vec<Task>> {
    let state = state.inner().clone();
    run_blocking(move || state.tasks().list_tasks()).await
}

#[tauri::command]
pub async fn tasks_get(state: State<'_, AppState>, id: String) -> CommandResult<Task> {
    let state = state.inner().clone();
    run_blocking(move || state.tasks().get_task(&id)).await
}

#[tauri::command]
pub async fn tasks_create(state: State<'_, AppState>, payload: TaskCreateInput) -> CommandResult<Task> {
    let state = state.inner().clone();
    run_blocking(move || state.tasks().create_task(payload)).await
}

#[tauri::command]
pub async fn tasks_update(
    state: State<'_, AppState>,
    id: String,
    payload: TaskUpdateInput,
) -> CommandResult<Task> {
    let state = state.inner().clone();
    run_blocking(move || state.tasks().update_task(&id, payload)).await
}

#[tauri::command]
pub async fn tasks_delete(state: State<'_, AppState>, id: String) -> CommandResult<()> {
    let state = state.inner().clone();
    run_blocking(move || state.tasks().delete_task(&id)).await
}

/// Distinct project links in use. There is no standalone Project entity;
/// projects only exist as the `project_id` a Task happens to carry.
#[tauri::command]
pub async fn projects_list(state: State<'_, AppState>) -> CommandResult<Vec<String>> {
    let state = state.inner().clone();
    run_blocking(move || {
        let tasks = state.tasks().list_tasks()?;
        let projects: BTreeSet<String> = tasks.into_iter().filter_map(|t| t.project_id).collect();
        Ok(projects.into_iter().collect())
    })
    .await
}

pub(super) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T, AppError> + Send + 'static,
) -> CommandResult<T> {
    async_runtime::spawn_blocking(task)
        .await
        .map_err(|err| CommandError::new("INTERNAL", format!("command task panicked: {err}"), None))?
        .map_err(CommandError::from)
}

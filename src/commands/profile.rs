use tauri::State;

use crate::models::profile::{Profile, ProfilePatch};

use super::{AppState, CommandResult};

#[tauri::command]
pub async fn profile_get(state: State<'_, AppState>) -> CommandResult<Profile> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.profiles().get_profile()).await
}

#[tauri::command]
pub async fn profile_update(state: State<'_, AppState>, patch: ProfilePatch) -> CommandResult<Profile> {
    let state = state.inner().clone();
    super::task::run_blocking(move || state.profiles().update_profile(patch)).await
}

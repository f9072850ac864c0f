pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use tauri::Manager;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch application: {error}");
    }
}

fn try_run() -> Result<(), Box<dyn std::error::Error>> {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle();

            crate::utils::logger::init_logging(&handle)
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;

            let config = crate::config::Config::from_env()
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;

            let db_path = match &config.database_path {
                Some(path) => path.clone(),
                None => {
                    let mut data_dir = handle
                        .path()
                        .app_data_dir()
                        .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;
                    std::fs::create_dir_all(&data_dir)?;
                    data_dir.push("aawo.sqlite");
                    data_dir
                }
            };

            let pool = crate::db::DbPool::new(db_path)
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;

            let state = crate::commands::AppState::new(pool, &config)
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;
            app.manage(state);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            crate::commands::task::tasks_list,
            crate::commands::task::tasks_get,
            crate::commands::task::tasks_create,
            crate::commands::task::tasks_update,
            crate::commands::task::tasks_delete,
            crate::commands::task::projects_list,
            crate::commands::calendar::calendar_blocks_list,
            crate::commands::calendar::calendar_blocks_create,
            crate::commands::calendar::calendar_blocks_update,
            crate::commands::calendar::calendar_blocks_delete,
            crate::commands::meetings::meetings_get,
            crate::commands::meetings::meetings_ingest,
            crate::commands::meetings::action_items_list,
            crate::commands::meetings::action_items_approve,
            crate::commands::meetings::action_items_reject,
            crate::commands::approvals::approvals_list,
            crate::commands::approvals::approvals_resolve,
            crate::commands::scheduling::scheduling_proposals_generate,
            crate::commands::scheduling::scheduling_proposals_list,
            crate::commands::scheduling::scheduling_proposals_get,
            crate::commands::scheduling::scheduling_proposals_apply,
            crate::commands::assistant::assistant_chat,
            crate::commands::assistant::nli_command,
            crate::commands::profile::profile_get,
            crate::commands::profile::profile_update,
            crate::commands::sync::sync_status_get,
            crate::commands::briefings::briefings_daily,
        ])
        .run(tauri::generate_context!())?;

    Ok(())
}

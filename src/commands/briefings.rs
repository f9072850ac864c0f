use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tauri::State;

use crate::db::repositories::approval_repository::ApprovalRepository;
use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::models::calendar_block::CalendarBlock;
use crate::models::task::Task;

use super::{AppState, CommandResult};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBriefing {
    pub overdue_tasks: Vec<Task>,
    pub due_today: Vec<Task>,
    pub todays_blocks: Vec<CalendarBlock>,
    pub pending_approvals: i64,
}

/// Read-only rollup command (§6 `briefings/daily`): composes existing
/// repository reads, no dedicated component of its own.
#[tauri::command]
pub async fn briefings_daily(state: State<'_, AppState>) -> CommandResult<DailyBriefing> {
    let state = state.inner().clone();
    super::task::run_blocking(move || {
        state.db().with_connection(|conn| {
            let now = Utc::now();
            let day_end = now + ChronoDuration::hours(24);

            let non_terminal = TaskRepository::list_non_terminal(conn)?;
            let overdue_tasks: Vec<Task> = non_terminal.iter().filter(|t| t.is_late_at(now)).cloned().collect();
            let due_today: Vec<Task> = non_terminal
                .into_iter()
                .filter(|t| matches!(t.due, Some(due) if due >= now && due < day_end))
                .collect();

            let todays_blocks = CalendarBlockRepository::list_intersecting(conn, now, day_end)?;
            let pending_approvals = ApprovalRepository::list_pending(conn)?.len() as i64;

            Ok(DailyBriefing {
                overdue_tasks,
                due_today,
                todays_blocks,
                pending_approvals,
            })
        })
    })
    .await
}

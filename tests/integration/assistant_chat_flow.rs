use aawo_core_lib::db::repositories::approval_repository::ApprovalRepository;
use aawo_core_lib::db::repositories::calendar_block_repository::CalendarBlockRepository;
use aawo_core_lib::db::repositories::profile_repository::ProfileRepository;
use aawo_core_lib::db::repositories::task_repository::TaskRepository;
use aawo_core_lib::db::DbPool;
use aawo_core_lib::models::action::{Action, ChatTurn, Plan};
use aawo_core_lib::models::approval::ApprovalRequest;
use aawo_core_lib::models::calendar_block::{CalendarBlock, SOURCE_AAWO};
use aawo_core_lib::models::task::TaskCreateInput;
use aawo_core_lib::services::approval_state_machine::ApprovalStateMachine;
use aawo_core_lib::services::executor::Executor;
use aawo_core_lib::services::planner::{Planner, WorldSnapshot};
use aawo_core_lib::services::task_service::TaskService;
use chrono::{TimeZone, Utc};
use tempfile::tempdir;
use uuid::Uuid;

fn fresh_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempdir().unwrap();
    let pool = DbPool::new(dir.path().join("aawo-test.sqlite")).unwrap();
    (dir, pool)
}

#[tokio::test]
async fn planner_fallback_creates_a_task_through_the_executor() {
    let (_dir, pool) = fresh_pool();
    let mut conn = pool.get_connection().unwrap();
    let profile = ProfileRepository::get_or_create(&conn).unwrap();
    let now = Utc::now();

    let tasks = TaskRepository::list_non_terminal(&conn).unwrap();
    let blocks = CalendarBlockRepository::list_future_non_external(&conn, now).unwrap();
    let approvals = ApprovalRepository::list_pending(&conn).unwrap();
    let snapshot = WorldSnapshot { tasks: &tasks, blocks: &blocks, approvals: &approvals };

    let plan = Planner::plan(None, "please add a task to write the report", &[], &snapshot, false, now)
        .await
        .unwrap();
    assert_eq!(plan.actions.len(), 1);
    assert!(matches!(plan.actions[0], Action::CreateTask { .. }));

    let outcome = Executor::execute(&mut conn, None, None, &profile, plan.actions[0].clone(), "please add a task to write the report", &[], now)
        .await
        .unwrap();

    assert!(outcome.approval_id.is_none());
    assert_eq!(outcome.refresh, vec!["tasks".to_string()]);

    let persisted = TaskRepository::list_non_terminal(&conn).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].title, "please add a task to write the report");
}

#[tokio::test]
async fn unrecognized_priority_word_stops_at_a_clarification_gate() {
    let (_dir, pool) = fresh_pool();
    let mut conn = pool.get_connection().unwrap();
    let profile = ProfileRepository::get_or_create(&conn).unwrap();
    let now = Utc::now();

    let action = Action::UpdatePriority {
        task_keyword: "release notes".to_string(),
        priority: "urgent".to_string(),
    };
    let outcome = Executor::execute(&mut conn, None, None, &profile, action, "bump release notes to urgent", &[], now)
        .await
        .unwrap();

    assert!(outcome.approval_id.is_some());
    assert_eq!(outcome.refresh, vec!["approvals".to_string()]);

    let pending = ApprovalRepository::list_pending(&conn).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].approval_type, "chat_clarification");
}

#[tokio::test]
async fn a_new_concrete_plan_supersedes_a_stale_clarification() {
    let (_dir, pool) = fresh_pool();
    let conn = pool.get_connection().unwrap();
    let now = Utc::now();

    let clarification = ApprovalRequest {
        id: Uuid::new_v4().to_string(),
        approval_type: "chat_clarification".to_string(),
        status: "pending".to_string(),
        payload: aawo_core_lib::models::approval::ApprovalPayload::ChatClarification {
            question: "Which task or event did you mean?".to_string(),
            original_message: "mark that as done".to_string(),
        },
        reason: None,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    };
    ApprovalRepository::insert(&conn, &clarification).unwrap();

    let plan = Plan {
        actions: vec![Action::CreateTask { title: "Draft agenda".into(), due: None, effort_minutes: None, priority: None }],
        note: None,
    };
    ApprovalStateMachine::supersede_clarification_if_needed(&conn, &plan).unwrap();

    let refreshed = ApprovalRepository::find_by_id(&conn, &clarification.id).unwrap();
    assert_eq!(refreshed.status, "rejected");
    assert_eq!(refreshed.reason.as_deref(), Some("clarification_superseded_by_new_command"));
}

#[tokio::test]
async fn confirmation_gated_reschedule_runs_after_a_chat_yes() {
    let (_dir, pool) = fresh_pool();
    let mut conn = pool.get_connection().unwrap();
    let profile = ProfileRepository::get_or_create(&conn).unwrap();

    // Monday, inside the default mon-fri 09:00-18:00 working window.
    let now = Utc.with_ymd_and_hms(2024, 1, 8, 8, 0, 0).unwrap();

    let tasks = TaskService::new(pool.clone());
    let task = tasks
        .create_task(TaskCreateInput { title: "Evening sync".to_string(), effort_minutes: Some(30), ..Default::default() })
        .unwrap();

    let late_block = CalendarBlock {
        id: Uuid::new_v4().to_string(),
        kind: "task_block".to_string(),
        title: "Evening sync block".to_string(),
        start: Utc.with_ymd_and_hms(2024, 1, 8, 19, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 8, 19, 30, 0).unwrap(),
        task_id: Some(task.id.clone()),
        locked: false,
        source: SOURCE_AAWO.to_string(),
        external_event_id: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    CalendarBlockRepository::insert(&conn, &late_block).unwrap();

    // Confirmation gate: RescheduleAfterHour always confirms before acting.
    let gated = Executor::execute(
        &mut conn,
        None,
        None,
        &profile,
        Action::RescheduleAfterHour { cutoff_hour: 18 },
        "reschedule everything after 6pm",
        &[],
        now,
    )
    .await
    .unwrap();
    assert!(gated.approval_id.is_some());
    assert!(gated.reply.contains("Confirm?"));
    assert!(CalendarBlockRepository::find_by_id(&conn, &late_block.id).is_ok());

    // A bare "yes" resolves the pending confirmation and actually dispatches it.
    let resolved = ApprovalStateMachine::resolve_from_chat(&mut conn, None, None, &profile, "yes", now)
        .await
        .unwrap()
        .expect("a chat_pending_action was pending");

    assert!(resolved.reply.contains("Rescheduled 1"));
    assert!(resolved.refresh.contains(&"tasks".to_string()));
    assert!(resolved.refresh.contains(&"calendar".to_string()));
    assert!(CalendarBlockRepository::find_by_id(&conn, &late_block.id).is_err());

    let pending_after = ApprovalRepository::list_pending(&conn).unwrap();
    assert!(pending_after.is_empty());
}

#[tokio::test]
async fn chat_turns_carry_history_for_planner_context() {
    let history = vec![
        ChatTurn { role: "user".to_string(), text: "what's on my plate today".to_string() },
        ChatTurn { role: "assistant".to_string(), text: "You have 2 tasks due today.".to_string() },
    ];
    let (_dir, pool) = fresh_pool();
    let conn = pool.get_connection().unwrap();
    let now = Utc::now();
    let tasks = TaskRepository::list_non_terminal(&conn).unwrap();
    let blocks = CalendarBlockRepository::list_future_non_external(&conn, now).unwrap();
    let approvals = ApprovalRepository::list_pending(&conn).unwrap();
    let snapshot = WorldSnapshot { tasks: &tasks, blocks: &blocks, approvals: &approvals };

    let plan = Planner::plan(None, "mark it as done", &history, &snapshot, false, now).await.unwrap();
    assert!(matches!(plan.actions.first(), Some(Action::CompleteTask { .. })));
}

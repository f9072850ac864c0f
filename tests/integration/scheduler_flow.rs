use aawo_core_lib::db::repositories::calendar_block_repository::CalendarBlockRepository;
use aawo_core_lib::db::repositories::profile_repository::ProfileRepository;
use aawo_core_lib::db::repositories::proposal_repository::ProposalRepository;
use aawo_core_lib::db::DbPool;
use aawo_core_lib::models::task::TaskCreateInput;
use aawo_core_lib::services::proposal_applier::ProposalApplier;
use aawo_core_lib::services::scheduler::Scheduler;
use aawo_core_lib::services::task_service::TaskService;
use chrono::{TimeZone, Utc};
use tempfile::tempdir;

fn fresh_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempdir().unwrap();
    let pool = DbPool::new(dir.path().join("aawo-test.sqlite")).unwrap();
    (dir, pool)
}

/// 2024-01-08 is a Monday, inside the default profile's mon-fri 09:00-18:00
/// working hours with no pre-existing calendar blocks.
fn monday_horizon() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let start = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
    (start, end)
}

#[test]
fn generate_then_apply_places_non_conflicting_blocks() {
    let (_dir, pool) = fresh_pool();
    let tasks = TaskService::new(pool.clone());

    let task = tasks
        .create_task(TaskCreateInput {
            title: "Write quarterly report".to_string(),
            effort_minutes: Some(60),
            priority: Some("high".to_string()),
            ..Default::default()
        })
        .unwrap();

    let (horizon_start, horizon_end) = monday_horizon();

    let (proposal, outcome) = pool
        .with_connection_mut(|conn| {
            let profile = ProfileRepository::get_or_create(conn)?;
            let existing_blocks = CalendarBlockRepository::list_intersecting(conn, horizon_start, horizon_end)?;
            let proposals = Scheduler::generate(
                &profile,
                horizon_start,
                horizon_end,
                vec![task.clone()],
                &existing_blocks,
                30,
                1,
            )?;
            let proposal = proposals.into_iter().next().expect("one strategy requested");
            ProposalRepository::insert_with_changes(conn, &proposal)?;
            let outcome = ProposalApplier::apply(conn, &proposal.id)?;
            Ok((proposal, outcome))
        })
        .unwrap();

    assert_eq!(proposal.status, "draft");
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.created_blocks.len(), 1);
    assert_eq!(outcome.created_blocks[0].task_id.as_deref(), Some(task.id.as_str()));

    let persisted = pool
        .with_connection(|conn| ProposalRepository::find_by_id(conn, &proposal.id))
        .unwrap();
    assert_eq!(persisted.status, "applied");

    let blocks = pool
        .with_connection(|conn| CalendarBlockRepository::list_intersecting(conn, horizon_start, horizon_end))
        .unwrap();
    assert_eq!(blocks.len(), 1);
}

#[test]
fn applying_a_proposal_twice_conflicts() {
    let (_dir, pool) = fresh_pool();
    let tasks = TaskService::new(pool.clone());
    let task = tasks
        .create_task(TaskCreateInput {
            title: "Prepare onboarding doc".to_string(),
            effort_minutes: Some(45),
            ..Default::default()
        })
        .unwrap();
    let (horizon_start, horizon_end) = monday_horizon();

    let proposal_id = pool
        .with_connection_mut(|conn| {
            let profile = ProfileRepository::get_or_create(conn)?;
            let existing_blocks = CalendarBlockRepository::list_intersecting(conn, horizon_start, horizon_end)?;
            let proposals = Scheduler::generate(
                &profile,
                horizon_start,
                horizon_end,
                vec![task.clone()],
                &existing_blocks,
                30,
                1,
            )?;
            let proposal = proposals.into_iter().next().unwrap();
            ProposalRepository::insert_with_changes(conn, &proposal)?;
            ProposalApplier::apply(conn, &proposal.id)?;
            Ok(proposal.id)
        })
        .unwrap();

    let second_attempt = pool.with_connection(|conn| ProposalApplier::apply(conn, &proposal_id));
    assert!(second_attempt.is_err());
}

#[test]
fn generate_rejects_out_of_range_slot_minutes() {
    let (_dir, pool) = fresh_pool();
    let (horizon_start, horizon_end) = monday_horizon();
    let result = pool.with_connection(|conn| {
        let profile = ProfileRepository::get_or_create(conn)?;
        Scheduler::generate(&profile, horizon_start, horizon_end, vec![], &[], 5, 1)
    });
    assert!(result.is_err());
}

use aawo_core_lib::db::repositories::meeting_repository::{ActionItemCandidateRepository, MeetingRepository};
use aawo_core_lib::db::repositories::task_repository::TaskRepository;
use aawo_core_lib::db::DbPool;
use aawo_core_lib::models::meeting::{is_auto_approvable, ActionItemCandidate, Meeting, TranscriptUtterance};
use aawo_core_lib::models::task::Task;
use aawo_core_lib::services::meeting_extractor::MeetingExtractor;
use chrono::Utc;
use tempfile::tempdir;
use uuid::Uuid;

fn fresh_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempdir().unwrap();
    let pool = DbPool::new(dir.path().join("aawo-test.sqlite")).unwrap();
    (dir, pool)
}

fn utterance(speaker: &str, text: &str) -> TranscriptUtterance {
    TranscriptUtterance {
        ts_ms: 0,
        speaker: Some(speaker.to_string()),
        text: text.to_string(),
    }
}

/// Mirrors the persistence/auto-create flow in the meeting-ingest command:
/// extract with no LLM configured (deterministic fallback), persist one
/// candidate per draft, and auto-create a task for confident, small ones.
async fn ingest(pool: &DbPool, meeting: Meeting) -> (Meeting, Vec<ActionItemCandidate>) {
    let now = Utc::now();
    pool.with_connection(|conn| MeetingRepository::insert(conn, &meeting)).unwrap();

    let drafts = MeetingExtractor::extract(None, &meeting, now).await;

    let mut candidates = Vec::new();
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
        pool.with_connection(|conn| ActionItemCandidateRepository::insert(conn, &candidate)).unwrap();

        if is_auto_approvable(candidate.confidence, candidate.effort_minutes) {
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
                source_ref: Some(meeting.id.clone()),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            pool.with_connection(|conn| TaskRepository::insert(conn, &task)).unwrap();
            pool.with_connection(|conn| {
                ActionItemCandidateRepository::update_status_and_link(conn, &candidate.id, "approved", Some(&task.id))
            })
            .unwrap();
        }
        candidates.push(candidate);
    }

    pool.with_connection(|conn| MeetingRepository::update_extraction_status(conn, &meeting.id, "completed"))
        .unwrap();

    let refreshed = pool.with_connection(|conn| MeetingRepository::find_by_id(conn, &meeting.id)).unwrap();
    let stored_candidates = pool
        .with_connection(|conn| ActionItemCandidateRepository::list_by_meeting(conn, &meeting.id))
        .unwrap();
    (refreshed, stored_candidates)
}

#[tokio::test]
async fn confident_small_candidate_auto_creates_a_task() {
    let (_dir, pool) = fresh_pool();
    let meeting = Meeting {
        id: Uuid::new_v4().to_string(),
        title: Some("Weekly sync".to_string()),
        started_at: None,
        ended_at: None,
        summary: None,
        transcript: vec![utterance(
            "pat",
            "Maria will send the report by tomorrow.",
        )],
        extraction_status: "pending".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let (refreshed, candidates) = ingest(&pool, meeting).await;

    assert_eq!(refreshed.extraction_status, "completed");
    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert!(is_auto_approvable(candidate.confidence, candidate.effort_minutes));
    assert_eq!(candidate.status, "approved");
    let task_id = candidate.linked_task_id.clone().expect("auto-created task linked");

    let task = pool.with_connection(|conn| TaskRepository::find_by_id(conn, &task_id)).unwrap();
    assert_eq!(task.source, "meeting");
    assert_eq!(task.status, "todo");
}

#[tokio::test]
async fn low_confidence_heavy_candidate_stays_pending() {
    let (_dir, pool) = fresh_pool();
    let meeting = Meeting {
        id: Uuid::new_v4().to_string(),
        title: Some("Planning review".to_string()),
        started_at: None,
        ended_at: None,
        summary: None,
        transcript: vec![utterance(
            "sam",
            "Alex needs to prepare the deck, it will take 5 hours",
        )],
        extraction_status: "pending".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let (_refreshed, candidates) = ingest(&pool, meeting).await;

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert!(!is_auto_approvable(candidate.confidence, candidate.effort_minutes));
    assert_eq!(candidate.status, "pending");
    assert!(candidate.linked_task_id.is_none());
}

#[tokio::test]
async fn transcript_with_no_action_hints_yields_no_candidates() {
    let (_dir, pool) = fresh_pool();
    let meeting = Meeting {
        id: Uuid::new_v4().to_string(),
        title: Some("Casual chat".to_string()),
        started_at: None,
        ended_at: None,
        summary: None,
        transcript: vec![utterance("pat", "Good morning everyone, how was the weekend?")],
        extraction_status: "pending".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let (refreshed, candidates) = ingest(&pool, meeting).await;
    assert_eq!(refreshed.extraction_status, "completed");
    assert!(candidates.is_empty());
}

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use rusqlite::Connection;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::db::repositories::approval_repository::ApprovalRepository;
use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::db::repositories::meeting_repository::{ActionItemCandidateRepository, MeetingRepository};
use crate::db::repositories::proposal_repository::ProposalRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::error::{AppError, AppResult};
use crate::models::action::{is_generic_keyword, Action, ChatTurn};
use crate::models::approval::{ApprovalPayload, ApprovalRequest};
use crate::models::calendar_block::{CalendarBlock, SOURCE_AAWO};
use crate::models::meeting::{is_auto_approvable, ActionItemCandidate, Meeting, TranscriptUtterance};
use crate::models::profile::{requires_approval, Profile};
use crate::models::task::{self, Task};
use crate::services::calendar_mirror::CalendarMirror;
use crate::services::free_slot_finder;
use crate::services::llm_client::LlmClient;
use crate::services::meeting_extractor::MeetingExtractor;
use crate::services::proposal_applier::ProposalApplier;
use crate::services::scheduler::Scheduler;
use crate::services::time_algebra;

/// Result of dispatching one action: a user-facing reply, resource tags the
/// frontend should refresh, and the approval id if the turn stopped at a
/// clarification or confirmation gate (§4.8).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub reply: String,
    pub refresh: Vec<String>,
    pub approval_id: Option<String>,
}

pub struct Executor;

impl Executor {
    /// Runs the three pre-dispatch checks (clarification, reference
    /// resolution, confirmation) and, if none short-circuits the turn,
    /// dispatches to the action's handler.
    pub async fn execute(
        conn: &mut Connection,
        llm: Option<&LlmClient>,
        mirror: Option<&CalendarMirror>,
        profile: &Profile,
        action: Action,
        original_message: &str,
        history: &[ChatTurn],
        now: DateTime<Utc>,
    ) -> AppResult<ExecutionOutcome> {
        let action = resolve_reference(action, original_message, history);

        if let Some(question) = clarification_question(&action) {
            let approval = ApprovalRequest {
                id: Uuid::new_v4().to_string(),
                approval_type: "chat_clarification".to_string(),
                status: "pending".to_string(),
                payload: ApprovalPayload::ChatClarification {
                    question: question.clone(),
                    original_message: original_message.to_string(),
                },
                reason: None,
                resolved_at: None,
                created_at: now,
                updated_at: now,
            };
            ApprovalRepository::insert(conn, &approval)?;
            return Ok(ExecutionOutcome {
                reply: question,
                refresh: vec!["approvals".to_string()],
                approval_id: Some(approval.id),
            });
        }

        if action.always_confirms() {
            let approval = ApprovalRequest {
                id: Uuid::new_v4().to_string(),
                approval_type: "chat_pending_action".to_string(),
                status: "pending".to_string(),
                payload: ApprovalPayload::ChatPendingAction {
                    action: action.clone(),
                    source_message: original_message.to_string(),
                },
                reason: None,
                resolved_at: None,
                created_at: now,
                updated_at: now,
            };
            ApprovalRepository::insert(conn, &approval)?;
            return Ok(ExecutionOutcome {
                reply: format!("This will {}. Confirm?", describe_action(&action)),
                refresh: vec!["approvals".to_string()],
                approval_id: Some(approval.id),
            });
        }

        Self::dispatch(conn, llm, mirror, profile, action, now).await
    }

    /// Runs a single action directly, bypassing the confirmation gate. Used
    /// by the approval state machine once a `chat_pending_action` has been
    /// approved (§4.9).
    pub async fn dispatch(
        conn: &mut Connection,
        llm: Option<&LlmClient>,
        mirror: Option<&CalendarMirror>,
        profile: &Profile,
        action: Action,
        now: DateTime<Utc>,
    ) -> AppResult<ExecutionOutcome> {
        match action {
            Action::CreateTask {
                title,
                due,
                effort_minutes,
                priority,
            } => create_task(conn, title, due, effort_minutes, priority),
            Action::CreateEvent {
                title,
                start,
                duration_minutes,
            } => create_event(conn, mirror, title, start, duration_minutes).await,
            Action::UpdateTask {
                task_keyword,
                new_title,
                description,
                priority,
                status,
                due,
                effort_minutes,
            } => update_task(
                conn,
                task_keyword,
                new_title,
                description,
                priority,
                status,
                due,
                effort_minutes,
            ),
            Action::DeleteTask { task_keyword } => delete_task(conn, task_keyword),
            Action::StartTask { task_keyword } => {
                set_status(conn, task_keyword, "in_progress", "start_task")
            }
            Action::CompleteTask { task_keyword } => {
                set_status(conn, task_keyword, "done", "complete_task")
            }
            Action::UpdatePriority {
                task_keyword,
                priority,
            } => update_priority(conn, task_keyword, priority),
            Action::UpdateDue { task_keyword, due } => update_due(conn, task_keyword, due),
            Action::ListTasks { limit } => list_tasks(conn, limit),
            Action::ListEvents { target_date, limit } => list_events(conn, target_date, limit, now),
            Action::FindFreeTime {
                target_date,
                duration_minutes,
            } => find_free_time(conn, profile, target_date, duration_minutes),
            Action::MoveEvent {
                task_keyword,
                start,
                duration_minutes,
            } => move_event(conn, task_keyword, start, duration_minutes),
            Action::DeleteEvent { task_keyword } => delete_event(conn, mirror, task_keyword).await,
            Action::UpdateEvent {
                task_keyword,
                new_title,
                start,
                duration_minutes,
            } => update_event(conn, task_keyword, new_title, start, duration_minutes),
            Action::RescheduleRequest { hint } => reschedule_request(conn, profile, hint, now),
            Action::RescheduleAfterHour { cutoff_hour } => {
                reschedule_after_hour(conn, mirror, profile, cutoff_hour, now).await
            }
            Action::DeleteDuplicateTasks => delete_duplicate_tasks(conn),
            Action::RegisterMeetingNote { meeting_note } => {
                register_meeting_note(conn, llm, meeting_note, now).await
            }
            Action::Unknown { note } => Ok(ExecutionOutcome {
                reply: note.unwrap_or_else(|| "I'm not sure what you'd like me to do.".to_string()),
                refresh: vec![],
                approval_id: None,
            }),
        }
    }
}

const REFERENTIAL_TOKENS: [&str; 5] = [" that task", " this task", " that one", " that event", " it "];

/// Overrides a generic task/event keyword with a concrete title mentioned
/// earlier in the conversation, when the message itself only refers to "it"
/// or "that task" (§4.8 check 2).
fn resolve_reference(action: Action, message: &str, history: &[ChatTurn]) -> Action {
    let padded = format!(" {} ", message.to_lowercase());
    if !REFERENTIAL_TOKENS.iter().any(|token| padded.contains(token)) {
        return action;
    }
    let Some(keyword) = action.task_keyword() else {
        return action;
    };
    if !is_generic_keyword(keyword) {
        return action;
    }
    for turn in history.iter().rev() {
        if let Some(found) = extract_quoted_title(&turn.text) {
            return override_task_keyword(action, found);
        }
    }
    action
}

fn extract_quoted_title(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let rest = &text[start + 1..];
    let end = rest.find('"')?;
    let candidate = rest[..end].trim();
    if candidate.chars().count() >= 2 {
        Some(candidate.to_string())
    } else {
        None
    }
}

fn override_task_keyword(action: Action, keyword: String) -> Action {
    match action {
        Action::UpdateTask {
            new_title,
            description,
            priority,
            status,
            due,
            effort_minutes,
            ..
        } => Action::UpdateTask {
            task_keyword: keyword,
            new_title,
            description,
            priority,
            status,
            due,
            effort_minutes,
        },
        Action::DeleteTask { .. } => Action::DeleteTask { task_keyword: keyword },
        Action::StartTask { .. } => Action::StartTask { task_keyword: keyword },
        Action::CompleteTask { .. } => Action::CompleteTask { task_keyword: keyword },
        Action::UpdatePriority { priority, .. } => Action::UpdatePriority {
            task_keyword: keyword,
            priority,
        },
        Action::UpdateDue { due, .. } => Action::UpdateDue {
            task_keyword: keyword,
            due,
        },
        Action::MoveEvent {
            start,
            duration_minutes,
            ..
        } => Action::MoveEvent {
            task_keyword: keyword,
            start,
            duration_minutes,
        },
        Action::DeleteEvent { .. } => Action::DeleteEvent { task_keyword: keyword },
        Action::UpdateEvent {
            new_title,
            start,
            duration_minutes,
            ..
        } => Action::UpdateEvent {
            task_keyword: keyword,
            new_title,
            start,
            duration_minutes,
        },
        other => other,
    }
}

/// Per-intent validation that the target is resolvable and required fields
/// are present (§4.8 check 1). `None` means the action may proceed.
fn clarification_question(action: &Action) -> Option<String> {
    match action {
        Action::CreateTask { title, .. } if title.trim().is_empty() => {
            Some("What should the task be titled?".to_string())
        }
        Action::CreateEvent { title, .. } if title.trim().is_empty() => {
            Some("What should the event be titled?".to_string())
        }
        Action::RescheduleAfterHour { cutoff_hour } if *cutoff_hour > 23 => {
            Some("Which hour should I reschedule after?".to_string())
        }
        Action::UpdatePriority { priority, .. } if !task::PRIORITIES.contains(&priority.as_str()) => {
            Some(format!(
                "\"{priority}\" isn't a priority I recognize — low, medium, high, or critical?"
            ))
        }
        _ => {
            if let Some(keyword) = action.task_keyword() {
                if is_generic_keyword(keyword) {
                    return Some("Which task or event did you mean?".to_string());
                }
            }
            None
        }
    }
}

fn describe_action(action: &Action) -> String {
    match action {
        Action::RescheduleAfterHour { cutoff_hour } => {
            format!("reschedule everything after {cutoff_hour:02}:00")
        }
        Action::DeleteDuplicateTasks => "merge duplicate tasks".to_string(),
        other => other.intent_name().replace('_', " "),
    }
}

fn find_task(conn: &mut Connection, keyword: &str) -> AppResult<Task> {
    let keyword_norm = keyword.trim().to_lowercase();
    let tasks = TaskRepository::list_non_canceled(conn)?;
    let mut best: Option<(i32, Task)> = None;
    for candidate in tasks {
        let title_norm = candidate.title.to_lowercase();
        let score = task_match_score(&title_norm, &keyword_norm);
        if score > 0 && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, task)| task)
        .ok_or_else(|| AppError::not_found(format!("no task matching '{keyword}'")))
}

fn task_match_score(title_norm: &str, keyword_norm: &str) -> i32 {
    if title_norm == keyword_norm {
        100
    } else if title_norm.contains(keyword_norm) {
        50
    } else if keyword_norm
        .split_whitespace()
        .any(|word| word.len() > 2 && title_norm.contains(word))
    {
        10
    } else {
        0
    }
}

fn find_block(conn: &mut Connection, keyword: &str) -> AppResult<CalendarBlock> {
    let keyword_norm = keyword.trim().to_lowercase();
    let blocks = CalendarBlockRepository::list_future_non_external(conn, DateTime::<Utc>::MIN_UTC)?;
    let mut best: Option<(i32, CalendarBlock)> = None;
    for candidate in blocks {
        let title_norm = candidate.title.to_lowercase();
        let score = task_match_score(&title_norm, &keyword_norm);
        if score > 0 && best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
            best = Some((score, candidate));
        }
    }
    best.map(|(_, block)| block)
        .ok_or_else(|| AppError::not_found(format!("no event matching '{keyword}'")))
}

fn create_task(
    conn: &mut Connection,
    title: String,
    due: Option<DateTime<Utc>>,
    effort_minutes: Option<i64>,
    priority: Option<String>,
) -> AppResult<ExecutionOutcome> {
    let effort = effort_minutes
        .unwrap_or(60)
        .clamp(task::MIN_EFFORT_MINUTES, task::MAX_EFFORT_MINUTES);
    let priority = priority
        .filter(|p| task::PRIORITIES.contains(&p.as_str()))
        .unwrap_or_else(|| "medium".to_string());
    let now = Utc::now();
    let created = Task {
        id: Uuid::new_v4().to_string(),
        title: title.clone(),
        description: None,
        status: "todo".to_string(),
        priority,
        due,
        effort_minutes: effort,
        project_id: None,
        source: "chat".to_string(),
        source_ref: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    TaskRepository::insert(conn, &created)?;
    AuditRepository::record(conn, "create_task", "assistant", Some(&created.id), &json!({"title": title}))?;
    Ok(ExecutionOutcome {
        reply: format!("Created task \"{title}\"."),
        refresh: vec!["tasks".to_string()],
        approval_id: None,
    })
}

async fn create_event(
    conn: &mut Connection,
    mirror: Option<&CalendarMirror>,
    title: String,
    start: DateTime<Utc>,
    duration_minutes: i64,
) -> AppResult<ExecutionOutcome> {
    let end = start + ChronoDuration::minutes(duration_minutes);
    if end <= start {
        return Err(AppError::validation("event end must be after start"));
    }
    let conflicts = CalendarBlockRepository::list_intersecting(conn, start, end)?;
    if !conflicts.is_empty() {
        return Err(AppError::conflict("event overlaps an existing block"));
    }

    let now = Utc::now();
    let block = CalendarBlock {
        id: Uuid::new_v4().to_string(),
        kind: "other".to_string(),
        title: title.clone(),
        start,
        end,
        task_id: None,
        locked: false,
        source: SOURCE_AAWO.to_string(),
        external_event_id: None,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    CalendarBlockRepository::insert(conn, &block)?;
    AuditRepository::record(conn, "create_event", "assistant", Some(&block.id), &json!({"title": title}))?;

    if let Some(m) = mirror {
        if m.is_connected() {
            if let Err(error) = m.mirror(std::slice::from_ref(&block)).await {
                warn!(target: "aawo::upstream", kind = "mirror", error = %error, "mirror push failed on create, non-fatal");
            }
        }
    }

    Ok(ExecutionOutcome {
        reply: format!("Scheduled \"{title}\"."),
        refresh: vec!["calendar".to_string()],
        approval_id: None,
    })
}

fn move_event(
    conn: &mut Connection,
    keyword: String,
    new_start: DateTime<Utc>,
    duration_minutes: Option<i64>,
) -> AppResult<ExecutionOutcome> {
    let block = find_block(conn, &keyword)?;
    if block.is_external() {
        return Err(AppError::conflict("cannot move an externally sourced event"));
    }
    let duration = duration_minutes.unwrap_or_else(|| (block.end - block.start).num_minutes());
    let new_end = new_start + ChronoDuration::minutes(duration);
    let conflicts: Vec<_> = CalendarBlockRepository::list_intersecting(conn, new_start, new_end)?
        .into_iter()
        .filter(|b| b.id != block.id)
        .collect();
    if !conflicts.is_empty() {
        return Err(AppError::conflict("target time overlaps another event"));
    }

    let mut updated = block;
    updated.start = new_start;
    updated.end = new_end;
    updated.version += 1;
    updated.updated_at = Utc::now();
    CalendarBlockRepository::update(conn, &updated)?;
    AuditRepository::record(conn, "move_event", "assistant", Some(&updated.id), &json!({"start": new_start}))?;

    Ok(ExecutionOutcome {
        reply: format!("Moved \"{}\".", updated.title),
        refresh: vec!["calendar".to_string()],
        approval_id: None,
    })
}

fn update_event(
    conn: &mut Connection,
    keyword: String,
    new_title: Option<String>,
    start: Option<DateTime<Utc>>,
    duration_minutes: Option<i64>,
) -> AppResult<ExecutionOutcome> {
    let block = find_block(conn, &keyword)?;
    if block.is_external() {
        return Err(AppError::conflict("cannot modify an externally sourced event"));
    }

    let mut updated = block.clone();
    if let Some(title) = new_title {
        updated.title = title;
    }
    if start.is_some() || duration_minutes.is_some() {
        let new_start = start.unwrap_or(block.start);
        let duration = duration_minutes.unwrap_or_else(|| (block.end - block.start).num_minutes());
        let new_end = new_start + ChronoDuration::minutes(duration);
        let conflicts: Vec<_> = CalendarBlockRepository::list_intersecting(conn, new_start, new_end)?
            .into_iter()
            .filter(|b| b.id != block.id)
            .collect();
        if !conflicts.is_empty() {
            return Err(AppError::conflict("updated time overlaps another event"));
        }
        updated.start = new_start;
        updated.end = new_end;
    }
    updated.version += 1;
    updated.updated_at = Utc::now();
    CalendarBlockRepository::update(conn, &updated)?;
    AuditRepository::record(conn, "update_event", "assistant", Some(&updated.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Updated \"{}\".", updated.title),
        refresh: vec!["calendar".to_string()],
        approval_id: None,
    })
}

async fn delete_event(
    conn: &mut Connection,
    mirror: Option<&CalendarMirror>,
    keyword: String,
) -> AppResult<ExecutionOutcome> {
    let block = find_block(conn, &keyword)?;
    if block.external_event_id.is_some() {
        match mirror {
            Some(m) if m.is_connected() => {
                m.delete(std::slice::from_ref(&block)).await?;
            }
            _ => {
                return Err(AppError::conflict(
                    "cannot delete a mirrored event while the mirror is disconnected",
                ))
            }
        }
    }
    CalendarBlockRepository::delete(conn, &block.id)?;
    AuditRepository::record(conn, "delete_event", "assistant", Some(&block.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Deleted \"{}\".", block.title),
        refresh: vec!["calendar".to_string()],
        approval_id: None,
    })
}

fn set_status(
    conn: &mut Connection,
    keyword: String,
    status: &str,
    audit_action: &str,
) -> AppResult<ExecutionOutcome> {
    let mut updated = find_task(conn, &keyword)?;
    updated.status = status.to_string();
    updated.version += 1;
    updated.updated_at = Utc::now();
    TaskRepository::update(conn, &updated)?;
    AuditRepository::record(conn, audit_action, "assistant", Some(&updated.id), &json!({}))?;

    let verb = if status == "done" { "done" } else { "in progress" };
    Ok(ExecutionOutcome {
        reply: format!("Marked \"{}\" {}.", updated.title, verb),
        refresh: vec!["tasks".to_string()],
        approval_id: None,
    })
}

fn update_priority(conn: &mut Connection, keyword: String, priority: String) -> AppResult<ExecutionOutcome> {
    if !task::PRIORITIES.contains(&priority.as_str()) {
        return Err(AppError::validation(format!("unknown priority '{priority}'")));
    }
    let mut updated = find_task(conn, &keyword)?;
    updated.priority = priority;
    updated.version += 1;
    updated.updated_at = Utc::now();
    TaskRepository::update(conn, &updated)?;
    AuditRepository::record(conn, "update_priority", "assistant", Some(&updated.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Set \"{}\" priority to {}.", updated.title, updated.priority),
        refresh: vec!["tasks".to_string()],
        approval_id: None,
    })
}

fn update_due(conn: &mut Connection, keyword: String, due: DateTime<Utc>) -> AppResult<ExecutionOutcome> {
    let mut updated = find_task(conn, &keyword)?;
    updated.due = Some(due);
    updated.version += 1;
    updated.updated_at = Utc::now();
    TaskRepository::update(conn, &updated)?;
    AuditRepository::record(conn, "update_due", "assistant", Some(&updated.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Updated \"{}\" due date.", updated.title),
        refresh: vec!["tasks".to_string()],
        approval_id: None,
    })
}

fn update_task(
    conn: &mut Connection,
    keyword: String,
    new_title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    due: Option<DateTime<Utc>>,
    effort_minutes: Option<i64>,
) -> AppResult<ExecutionOutcome> {
    let mut updated = find_task(conn, &keyword)?;
    if let Some(title) = new_title {
        updated.title = title;
    }
    if let Some(desc) = description {
        updated.description = Some(desc);
    }
    if let Some(p) = priority {
        if !task::PRIORITIES.contains(&p.as_str()) {
            return Err(AppError::validation(format!("unknown priority '{p}'")));
        }
        updated.priority = p;
    }
    if let Some(s) = status {
        if !task::STATUSES.contains(&s.as_str()) {
            return Err(AppError::validation(format!("unknown status '{s}'")));
        }
        updated.status = s;
    }
    if due.is_some() {
        updated.due = due;
    }
    if let Some(effort) = effort_minutes {
        updated.effort_minutes = effort.clamp(task::MIN_EFFORT_MINUTES, task::MAX_EFFORT_MINUTES);
    }
    updated.version += 1;
    updated.updated_at = Utc::now();
    TaskRepository::update(conn, &updated)?;
    AuditRepository::record(conn, "update_task", "assistant", Some(&updated.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Updated \"{}\".", updated.title),
        refresh: vec!["tasks".to_string()],
        approval_id: None,
    })
}

fn delete_task(conn: &mut Connection, keyword: String) -> AppResult<ExecutionOutcome> {
    let found = find_task(conn, &keyword)?;
    CalendarBlockRepository::detach_task(conn, &found.id)?;
    TaskRepository::delete(conn, &found.id)?;
    AuditRepository::record(conn, "delete_task", "assistant", Some(&found.id), &json!({}))?;

    Ok(ExecutionOutcome {
        reply: format!("Deleted \"{}\".", found.title),
        refresh: vec!["tasks".to_string(), "calendar".to_string()],
        approval_id: None,
    })
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn duplicate_rank(t: &Task) -> (i32, i32, i32, i64, i64) {
    (
        task::status_rank(&t.status),
        task::priority_rank(&t.priority),
        t.due.is_some() as i32,
        t.description.as_ref().map(|d| d.chars().count() as i64).unwrap_or(0),
        t.updated_at.timestamp(),
    )
}

fn delete_duplicate_tasks(conn: &mut Connection) -> AppResult<ExecutionOutcome> {
    let tasks = TaskRepository::list_non_canceled(conn)?;
    let mut groups: HashMap<String, Vec<Task>> = HashMap::new();
    for t in tasks {
        let key = normalize_title(&t.title);
        if key.chars().count() < 3 {
            continue;
        }
        groups.entry(key).or_default().push(t);
    }

    let mut merged_count = 0i64;
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| duplicate_rank(b).cmp(&duplicate_rank(a)));
        let mut keeper = group[0].clone();
        let mut keeper_changed = false;
        for duplicate in &group[1..] {
            if keeper.description.is_none() && duplicate.description.is_some() {
                keeper.description = duplicate.description.clone();
                keeper_changed = true;
            }
            if keeper.due.is_none() && duplicate.due.is_some() {
                keeper.due = duplicate.due;
                keeper_changed = true;
            }
            if task::priority_rank(&duplicate.priority) > task::priority_rank(&keeper.priority) {
                keeper.priority = duplicate.priority.clone();
                keeper_changed = true;
            }
            CalendarBlockRepository::reparent(conn, &duplicate.id, &keeper.id)?;

            let mut canceled = duplicate.clone();
            canceled.status = "canceled".to_string();
            canceled.version += 1;
            canceled.updated_at = Utc::now();
            TaskRepository::update(conn, &canceled)?;
            merged_count += 1;
        }
        if keeper_changed {
            keeper.version += 1;
            keeper.updated_at = Utc::now();
            TaskRepository::update(conn, &keeper)?;
        }
    }

    AuditRepository::record(conn, "delete_duplicate_tasks", "assistant", None, &json!({"merged": merged_count}))?;
    Ok(ExecutionOutcome {
        reply: format!("Merged {merged_count} duplicate task(s)."),
        refresh: vec!["tasks".to_string(), "calendar".to_string()],
        approval_id: None,
    })
}

async fn reschedule_after_hour(
    conn: &mut Connection,
    mirror: Option<&CalendarMirror>,
    profile: &Profile,
    cutoff_hour: u8,
    now: DateTime<Utc>,
) -> AppResult<ExecutionOutcome> {
    if cutoff_hour > 23 {
        return Err(AppError::validation("cutoff_hour must be within 0..23"));
    }

    let tz = time_algebra::parse_tz(&profile.timezone);
    let candidates = CalendarBlockRepository::list_future_non_external(conn, now)?;
    let mut affected_task_ids = Vec::new();
    let mut skipped_without_task = 0;
    let mut to_delete = Vec::new();
    for block in &candidates {
        let local_start = time_algebra::coerce_tz(block.start, tz);
        let local_end = time_algebra::coerce_tz(block.end, tz);
        let start_hour = local_start.hour() as u8;
        let end_hour = local_end.hour() as u8;
        if start_hour >= cutoff_hour || end_hour > cutoff_hour {
            match &block.task_id {
                Some(task_id) => affected_task_ids.push(task_id.clone()),
                None => skipped_without_task += 1,
            }
            to_delete.push(block.clone());
        }
    }
    affected_task_ids.sort();
    affected_task_ids.dedup();

    if affected_task_ids.is_empty() {
        return Ok(ExecutionOutcome {
            reply: "No task-linked events found after that hour.".to_string(),
            refresh: vec![],
            approval_id: None,
        });
    }

    let tasks = TaskRepository::list_by_ids(conn, &affected_task_ids)?;
    let horizon_end = now + ChronoDuration::days(14);
    let existing_blocks = CalendarBlockRepository::list_intersecting(conn, now, horizon_end)?;
    let proposals = Scheduler::generate(profile, now, horizon_end, tasks, &existing_blocks, 30, 1)?;
    let proposal = proposals
        .into_iter()
        .next()
        .ok_or_else(|| AppError::internal("scheduler produced no proposal"))?;
    ProposalRepository::insert_with_changes(conn, &proposal)?;
    ProposalApplier::apply(conn, &proposal.id)?;

    let mirrored: Vec<CalendarBlock> = to_delete
        .iter()
        .filter(|b| b.external_event_id.is_some())
        .cloned()
        .collect();
    if !mirrored.is_empty() {
        match mirror {
            Some(m) if m.is_connected() => {
                m.delete(&mirrored).await?;
            }
            _ => {
                return Err(AppError::conflict(
                    "cannot clear mirrored events while the mirror is disconnected",
                ))
            }
        }
    }
    for block in &to_delete {
        CalendarBlockRepository::delete(conn, &block.id)?;
    }

    AuditRepository::record(
        conn,
        "reschedule_after_hour",
        "assistant",
        Some(&proposal.id),
        &json!({"cutoff_hour": cutoff_hour, "skipped_without_task": skipped_without_task}),
    )?;

    Ok(ExecutionOutcome {
        reply: format!("Rescheduled {} task(s) after {:02}:00.", affected_task_ids.len(), cutoff_hour),
        refresh: vec!["tasks".to_string(), "calendar".to_string()],
        approval_id: None,
    })
}

fn reschedule_request(
    conn: &mut Connection,
    profile: &Profile,
    hint: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<ExecutionOutcome> {
    let horizon_end = now + ChronoDuration::days(2);
    let candidates = TaskRepository::list_non_terminal(conn)?;
    let existing_blocks = CalendarBlockRepository::list_intersecting(conn, now, horizon_end)?;
    let proposals = Scheduler::generate(profile, now, horizon_end, candidates, &existing_blocks, 30, 1)?;
    let Some(proposal) = proposals.into_iter().next() else {
        return Ok(ExecutionOutcome {
            reply: "Nothing to reschedule right now.".to_string(),
            refresh: vec![],
            approval_id: None,
        });
    };
    ProposalRepository::insert_with_changes(conn, &proposal)?;

    if requires_approval(&profile.autonomy_level) {
        let approval = ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            approval_type: "reschedule".to_string(),
            status: "pending".to_string(),
            payload: ApprovalPayload::Reschedule {
                proposal_id: proposal.id.clone(),
            },
            reason: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        ApprovalRepository::insert(conn, &approval)?;
        AuditRepository::record(
            conn,
            "reschedule_request",
            "assistant",
            Some(&proposal.id),
            &json!({"hint": hint, "queued": true}),
        )?;
        return Ok(ExecutionOutcome {
            reply: "I've drafted a reschedule plan — approve to apply it.".to_string(),
            refresh: vec!["approvals".to_string()],
            approval_id: Some(approval.id),
        });
    }

    let outcome = ProposalApplier::apply(conn, &proposal.id)?;
    AuditRepository::record(
        conn,
        "reschedule_request",
        "assistant",
        Some(&proposal.id),
        &json!({"hint": hint, "created_blocks": outcome.created_blocks.len()}),
    )?;

    Ok(ExecutionOutcome {
        reply: format!("Rescheduled, placing {} block(s).", outcome.created_blocks.len()),
        refresh: vec!["tasks".to_string(), "calendar".to_string()],
        approval_id: None,
    })
}

fn list_tasks(conn: &mut Connection, limit: Option<i64>) -> AppResult<ExecutionOutcome> {
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let tasks = TaskRepository::list_recent(conn, limit)?;
    let reply = if tasks.is_empty() {
        "You have no tasks yet.".to_string()
    } else {
        let lines: Vec<String> = tasks
            .iter()
            .map(|t| format!("- {} ({}, {})", t.title, t.status, t.priority))
            .collect();
        format!("Here are your tasks:\n{}", lines.join("\n"))
    };
    Ok(ExecutionOutcome {
        reply,
        refresh: vec![],
        approval_id: None,
    })
}

fn list_events(
    conn: &mut Connection,
    target_date: Option<NaiveDate>,
    limit: Option<i64>,
    now: DateTime<Utc>,
) -> AppResult<ExecutionOutcome> {
    let (from, to) = match target_date {
        Some(date) => (
            Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()),
            Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap()),
        ),
        None => (now, now + ChronoDuration::days(7)),
    };
    let mut blocks = CalendarBlockRepository::list_intersecting(conn, from, to)?;
    let limit = limit.unwrap_or(20).clamp(1, 100) as usize;
    blocks.truncate(limit);

    let reply = if blocks.is_empty() {
        "No events in that range.".to_string()
    } else {
        let lines: Vec<String> = blocks
            .iter()
            .map(|b| format!("- {} ({} to {})", b.title, b.start.to_rfc3339(), b.end.to_rfc3339()))
            .collect();
        format!("Here are your events:\n{}", lines.join("\n"))
    };
    Ok(ExecutionOutcome {
        reply,
        refresh: vec![],
        approval_id: None,
    })
}

fn find_free_time(
    conn: &mut Connection,
    profile: &Profile,
    target_date: Option<NaiveDate>,
    duration_minutes: i64,
) -> AppResult<ExecutionOutcome> {
    let tz = time_algebra::parse_tz(&profile.timezone);
    let date = target_date.unwrap_or_else(|| time_algebra::coerce_tz(Utc::now(), tz).date_naive());
    let Some(next_date) = date.succ_opt() else {
        return Ok(ExecutionOutcome {
            reply: "No free slots found that day.".to_string(),
            refresh: vec![],
            approval_id: None,
        });
    };
    let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    let (Some(day_start), Some(day_end)) = (
        time_algebra::local_datetime_to_utc(date, midnight, tz),
        time_algebra::local_datetime_to_utc(next_date, midnight, tz),
    ) else {
        return Ok(ExecutionOutcome {
            reply: "No free slots found that day.".to_string(),
            refresh: vec![],
            approval_id: None,
        });
    };
    let blocks = CalendarBlockRepository::list_intersecting(conn, day_start, day_end)?;
    let free = free_slot_finder::find(profile, &blocks, day_start, day_end);

    let mut slots = Vec::new();
    for interval in free {
        if interval.duration_minutes() >= duration_minutes {
            slots.push(interval.start);
            if slots.len() == 3 {
                break;
            }
        }
    }

    let reply = if slots.is_empty() {
        "No free slots found that day.".to_string()
    } else {
        let formatted: Vec<String> = slots.iter().map(|s| s.to_rfc3339()).collect();
        format!("Free slots: {}", formatted.join(", "))
    };
    Ok(ExecutionOutcome {
        reply,
        refresh: vec![],
        approval_id: None,
    })
}

async fn register_meeting_note(
    conn: &mut Connection,
    llm: Option<&LlmClient>,
    meeting_note: String,
    now: DateTime<Utc>,
) -> AppResult<ExecutionOutcome> {
    let transcript = synthesize_transcript(&meeting_note, now);
    let meeting = Meeting {
        id: Uuid::new_v4().to_string(),
        title: None,
        started_at: Some(now),
        ended_at: Some(now),
        summary: None,
        transcript,
        extraction_status: "pending".to_string(),
        created_at: now,
        updated_at: now,
    };
    MeetingRepository::insert(conn, &meeting)?;

    let drafts = MeetingExtractor::extract(llm, &meeting, now).await;
    let mut auto_approved = 0;
    let mut queued = 0;
    for draft in &drafts {
        let candidate = ActionItemCandidate {
            id: Uuid::new_v4().to_string(),
            meeting_id: meeting.id.clone(),
            title: draft.title.clone(),
            assignee_name: draft.assignee_name.clone(),
            due: draft.due,
            effort_minutes: draft.effort_minutes,
            confidence: draft.confidence,
            rationale: Some(draft.rationale.clone()),
            status: "pending".to_string(),
            linked_task_id: None,
            created_at: now,
            updated_at: now,
        };
        ActionItemCandidateRepository::insert(conn, &candidate)?;

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
            TaskRepository::insert(conn, &task)?;
            ActionItemCandidateRepository::update_status_and_link(conn, &candidate.id, "approved", Some(&task.id))?;
            auto_approved += 1;
        } else {
            let approval = ApprovalRequest {
                id: Uuid::new_v4().to_string(),
                approval_type: "action_item".to_string(),
                status: "pending".to_string(),
                payload: ApprovalPayload::ActionItem {
                    candidate_id: candidate.id.clone(),
                },
                reason: None,
                resolved_at: None,
                created_at: now,
                updated_at: now,
            };
            ApprovalRepository::insert(conn, &approval)?;
            queued += 1;
        }
    }

    MeetingRepository::update_extraction_status(conn, &meeting.id, "completed")?;
    AuditRepository::record(
        conn,
        "register_meeting_note",
        "assistant",
        Some(&meeting.id),
        &json!({"auto_approved": auto_approved, "queued": queued}),
    )?;

    Ok(ExecutionOutcome {
        reply: format!("Captured meeting notes: {auto_approved} task(s) created, {queued} awaiting approval."),
        refresh: vec!["tasks".to_string(), "approvals".to_string()],
        approval_id: None,
    })
}

fn synthesize_transcript(note: &str, now: DateTime<Utc>) -> Vec<TranscriptUtterance> {
    note.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let (speaker, text) = match line.split_once(':') {
                Some((prefix, rest)) if !prefix.is_empty() && prefix.len() <= 20 => {
                    (Some(prefix.trim().to_string()), rest.trim().to_string())
                }
                _ => (None, line.to_string()),
            };
            TranscriptUtterance {
                ts_ms: now.timestamp_millis() + i as i64,
                speaker,
                text,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarification_flags_generic_keyword() {
        let action = Action::CompleteTask {
            task_keyword: "task".to_string(),
        };
        assert!(clarification_question(&action).is_some());
    }

    #[test]
    fn clarification_flags_empty_title() {
        let action = Action::CreateTask {
            title: "  ".to_string(),
            due: None,
            effort_minutes: None,
            priority: None,
        };
        assert!(clarification_question(&action).is_some());
    }

    #[test]
    fn clarification_passes_concrete_keyword() {
        let action = Action::CompleteTask {
            task_keyword: "write report".to_string(),
        };
        assert!(clarification_question(&action).is_none());
    }

    #[test]
    fn resolve_reference_overrides_generic_keyword_from_history() {
        let action = Action::CompleteTask {
            task_keyword: "task".to_string(),
        };
        let history = vec![ChatTurn {
            role: "assistant".to_string(),
            text: "Created task \"write quarterly report\".".to_string(),
        }];
        let resolved = resolve_reference(action, "mark that task done", &history);
        assert_eq!(resolved.task_keyword(), Some("write quarterly report"));
    }

    #[test]
    fn resolve_reference_leaves_concrete_keyword_alone() {
        let action = Action::CompleteTask {
            task_keyword: "write report".to_string(),
        };
        let history: Vec<ChatTurn> = vec![];
        let resolved = resolve_reference(action, "mark write report done", &history);
        assert_eq!(resolved.task_keyword(), Some("write report"));
    }

    #[test]
    fn duplicate_rank_prefers_in_progress_over_todo() {
        let now = Utc::now();
        let base = Task {
            id: "a".to_string(),
            title: "x".to_string(),
            description: None,
            status: "todo".to_string(),
            priority: "low".to_string(),
            due: None,
            effort_minutes: 30,
            project_id: None,
            source: "manual".to_string(),
            source_ref: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let mut in_progress = base.clone();
        in_progress.status = "in_progress".to_string();
        assert!(duplicate_rank(&in_progress) > duplicate_rank(&base));
    }

    #[test]
    fn synthesize_transcript_detects_speaker_prefix() {
        let now = Utc::now();
        let utterances = synthesize_transcript("Alice: ship by Friday\nno colon here", now);
        assert_eq!(utterances[0].speaker.as_deref(), Some("Alice"));
        assert_eq!(utterances[1].speaker, None);
    }
}

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::models::action::{is_generic_keyword, Action, ChatTurn, Plan};
use crate::models::approval::ApprovalRequest;
use crate::models::calendar_block::CalendarBlock;
use crate::models::task::Task;
use crate::services::llm_client::{LlmClient, LlmPurpose};

const MAX_ACTIONS_PER_TURN: usize = 5;
const MAX_TASK_CONTEXT: usize = 40;
const MAX_BLOCK_CONTEXT: usize = 60;
const MAX_APPROVAL_CONTEXT: usize = 20;
const MAX_HISTORY_TURNS: usize = 8;

/// Bounded context the Planner reasons over (§4.7).
pub struct WorldSnapshot<'a> {
    pub tasks: &'a [Task],
    pub blocks: &'a [CalendarBlock],
    pub approvals: &'a [ApprovalRequest],
}

const SYSTEM_PROMPT: &str = "You are a planning assistant that turns a user message into a list of \
typed actions against a personal task/calendar system. Respond as JSON: \
{\"actions\":[{\"intent\":str, ...fields}], \"note\":str|null}. Valid intents: create_task, \
create_event, update_task, delete_task, start_task, complete_task, update_priority, update_due, \
list_tasks, list_events, find_free_time, move_event, delete_event, update_event, \
reschedule_request, reschedule_after_hour, delete_duplicate_tasks, register_meeting_note, unknown. \
Set \"note\" to a clarifying question only when no action is confident.";

#[derive(Debug, Deserialize)]
struct LlmPlanResponse {
    #[serde(default)]
    actions: Vec<serde_json::Value>,
    #[serde(default)]
    note: Option<String>,
}

pub struct Planner;

impl Planner {
    /// Primary path is the LLM; on any failure (no client, upstream error,
    /// malformed response) falls back to the rule cascade unless
    /// `strict_llm` demands the caller surface the failure instead.
    pub async fn plan(
        llm: Option<&LlmClient>,
        message: &str,
        history: &[ChatTurn],
        snapshot: &WorldSnapshot<'_>,
        strict_llm: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Plan> {
        let trimmed_history: Vec<&ChatTurn> = history
            .iter()
            .rev()
            .take(MAX_HISTORY_TURNS)
            .collect();

        if let Some(client) = llm {
            match Self::plan_via_llm(client, message, &trimmed_history, snapshot, now).await {
                Ok(plan) => return Ok(Self::enforce_hard_rules(plan)),
                Err(error) => {
                    if strict_llm {
                        return Err(error);
                    }
                }
            }
        } else if strict_llm {
            return Err(crate::error::AppError::upstream_auth(
                crate::error::UpstreamKind::Llm,
                "no llm client configured and strict_llm is enabled",
            ));
        }

        let action = Self::fallback_classify(message, now);
        Ok(Self::enforce_hard_rules(Plan {
            actions: vec![action],
            note: None,
        }))
    }

    async fn plan_via_llm(
        client: &LlmClient,
        message: &str,
        history: &[&ChatTurn],
        snapshot: &WorldSnapshot<'_>,
        now: DateTime<Utc>,
    ) -> AppResult<Plan> {
        let task_context: Vec<_> = snapshot
            .tasks
            .iter()
            .take(MAX_TASK_CONTEXT)
            .map(|t| json!({"id": t.id, "title": t.title, "status": t.status, "priority": t.priority, "due": t.due}))
            .collect();
        let block_context: Vec<_> = snapshot
            .blocks
            .iter()
            .take(MAX_BLOCK_CONTEXT)
            .map(|b| json!({"id": b.id, "title": b.title, "start": b.start, "end": b.end}))
            .collect();
        let approval_context: Vec<_> = snapshot
            .approvals
            .iter()
            .take(MAX_APPROVAL_CONTEXT)
            .map(|a| json!({"id": a.id, "type": a.approval_type, "status": a.status}))
            .collect();

        let payload = json!({
            "message": message,
            "now": now.to_rfc3339(),
            "history": history.iter().map(|t| json!({"role": t.role, "text": t.text})).collect::<Vec<_>>(),
            "tasks": task_context,
            "blocks": block_context,
            "approvals": approval_context,
        });

        let invocation = client
            .complete_json(LlmPurpose::AssistantPlan, SYSTEM_PROMPT, &payload)
            .await?;
        let parsed: LlmPlanResponse = serde_json::from_value(invocation.content)?;

        let actions = parsed
            .actions
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Action>(value).ok())
            .collect();

        Ok(Plan {
            actions,
            note: parsed.note,
        })
    }

    /// Rule cascade keyed on lexical cues, used when no LLM is configured
    /// or the LLM call fails outside strict mode (§4.7).
    pub fn fallback_classify(text: &str, now: DateTime<Utc>) -> Action {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();

        if looks_like_meeting_note(trimmed) {
            return Action::RegisterMeetingNote {
                meeting_note: trimmed.to_string(),
            };
        }

        if contains_any(&lowered, &["duplicate", "dedupe", "dedup"])
            && contains_any(&lowered, &["clean", "remove", "merge", "delete"])
        {
            return Action::DeleteDuplicateTasks;
        }

        if contains_any(&lowered, &["cancel", "delete"]) && contains_any(&lowered, &["event", "meeting", "block"]) {
            return Action::DeleteEvent {
                task_keyword: extract_task_keyword(trimmed).unwrap_or_default(),
            };
        }

        if contains_any(&lowered, &["move", "reschedule", "shift"])
            && contains_any(&lowered, &["event", "meeting"])
            && !lowered.contains("after")
        {
            if let Some(start) = extract_start_datetime(&lowered, now) {
                return Action::MoveEvent {
                    task_keyword: extract_task_keyword(trimmed).unwrap_or_default(),
                    start,
                    duration_minutes: extract_duration_minutes(&lowered),
                };
            }
        }

        if contains_any(&lowered, &["reschedule", "shift", "move"]) && lowered.contains("after") {
            if let Some(cutoff) = extract_cutoff_hour(&lowered) {
                return Action::RescheduleAfterHour { cutoff_hour: cutoff };
            }
        }

        if lowered.contains("due") && contains_any(&lowered, &["change", "move", "shift", "push"]) {
            return Action::UpdateDue {
                task_keyword: extract_task_keyword(trimmed).unwrap_or_default(),
                due: Utc::now(),
            };
        }

        if lowered.contains("priority") {
            if let Some(priority) = extract_priority(&lowered) {
                return Action::UpdatePriority {
                    task_keyword: extract_task_keyword(trimmed).unwrap_or_default(),
                    priority,
                };
            }
        }

        if contains_any(&lowered, &["done", "complete", "finished"]) {
            return Action::CompleteTask {
                task_keyword: extract_task_keyword(trimmed).unwrap_or_default(),
            };
        }

        if contains_any(&lowered, &["event", "meeting", "call", "review", "sync"]) {
            if let Some(start) = extract_start_datetime(&lowered, now) {
                return Action::CreateEvent {
                    title: extract_event_title(trimmed),
                    start,
                    duration_minutes: extract_duration_minutes(&lowered).unwrap_or(30),
                };
            }
        }

        if contains_any(&lowered, &["add", "create", "new task"]) {
            return Action::CreateTask {
                title: trimmed.to_string(),
                due: None,
                effort_minutes: Some(60),
                priority: Some("medium".to_string()),
            };
        }

        // No verb cue at all, e.g. "tomorrow 10am 45-minute design review" —
        // a bare date/time/duration/title is still an event to create.
        if let Some(start) = extract_start_datetime(&lowered, now) {
            return Action::CreateEvent {
                title: extract_event_title(trimmed),
                start,
                duration_minutes: extract_duration_minutes(&lowered).unwrap_or(30),
            };
        }

        if contains_any(&lowered, &["reschedule", "free time", "schedule"]) {
            return Action::RescheduleRequest {
                hint: Some(trimmed.to_string()),
            };
        }

        Action::Unknown { note: None }
    }

    /// Hard rules from §4.7: meeting notes are holistic, singleton intents
    /// dedupe, and at most 5 actions survive per turn.
    pub fn enforce_hard_rules(mut plan: Plan) -> Plan {
        if plan.actions.iter().any(|a| matches!(a, Action::RegisterMeetingNote { .. })) {
            plan.actions.retain(|a| matches!(a, Action::RegisterMeetingNote { .. }));
            plan.actions.truncate(1);
            return plan;
        }

        let mut seen_singletons = std::collections::HashSet::new();
        plan.actions.retain(|action| {
            if action.is_singleton() {
                seen_singletons.insert(action.intent_name())
            } else {
                true
            }
        });

        plan.actions.retain(|action| match action.task_keyword() {
            Some(keyword) => !is_generic_keyword(keyword),
            None => true,
        });

        plan.actions.truncate(MAX_ACTIONS_PER_TURN);
        plan
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn looks_like_meeting_note(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if lowered.starts_with("meeting notes") || lowered.contains("meeting notes:") {
        return true;
    }
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let speaker_like = lines
        .iter()
        .filter(|line| line.contains(':') && line.split(':').next().map(|s| s.len() <= 20).unwrap_or(false))
        .count();
    lines.len() >= 2 && speaker_like >= 1
}

fn extract_cutoff_hour(lowered: &str) -> Option<u8> {
    if let Ok(re) = Regex::new(r"(\d{1,2})\s*(am|pm)") {
        if let Some(caps) = re.captures(lowered) {
            let mut hour: u8 = caps[1].parse().ok()?;
            if &caps[2] == "pm" && hour < 12 {
                hour += 12;
            }
            if &caps[2] == "am" && hour == 12 {
                hour = 0;
            }
            if hour <= 23 {
                return Some(hour);
            }
        }
    }
    if let Ok(re) = Regex::new(r"after\s*(\d{1,2})") {
        if let Some(caps) = re.captures(lowered) {
            let hour: u8 = caps[1].parse().ok()?;
            if hour <= 23 {
                return Some(hour);
            }
        }
    }
    if lowered.contains("evening") {
        return Some(18);
    }
    None
}

/// Combines a relative date cue ("tomorrow", a weekday name) with a
/// trailing time-of-day into a concrete instant, used by the event
/// branches below. Returns `None` when either half is missing, since an
/// event needs a real start time, not a fallback like `end_of_day`.
fn extract_start_datetime(lowered: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = extract_relative_date(lowered, now.date_naive())?;
    let time = extract_time_of_day(lowered)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

fn extract_relative_date(lowered: &str, today: NaiveDate) -> Option<NaiveDate> {
    if lowered.contains("tomorrow") {
        today.succ_opt()
    } else if lowered.contains("today") {
        Some(today)
    } else {
        find_next_weekday(lowered).map(|weekday| next_weekday_date(today, weekday))
    }
}

fn find_next_weekday(lowered: &str) -> Option<Weekday> {
    const DAYS: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];
    DAYS.iter().find(|(name, _)| lowered.contains(name)).map(|(_, day)| *day)
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let mut date = from.succ_opt().unwrap_or(from);
    while date.weekday() != target {
        date = date.succ_opt().unwrap_or(date);
    }
    date
}

fn extract_time_of_day(lowered: &str) -> Option<NaiveTime> {
    if let Ok(re) = Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b") {
        if let Some(caps) = re.captures(lowered) {
            let mut hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let is_pm = &caps[3] == "pm";
            if hour == 12 {
                hour = 0;
            }
            if is_pm {
                hour += 12;
            }
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
    }
    if let Ok(re) = Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b") {
        if let Some(caps) = re.captures(lowered) {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
    }
    None
}

fn extract_duration_minutes(lowered: &str) -> Option<i64> {
    if let Ok(re) = Regex::new(r"(\d+)[\s-]*(?:minute|min)s?\b") {
        if let Some(caps) = re.captures(lowered) {
            return caps[1].parse().ok();
        }
    }
    if let Ok(re) = Regex::new(r"(\d+)[\s-]*(?:hour|hr)s?\b") {
        if let Some(caps) = re.captures(lowered) {
            let hours: i64 = caps[1].parse().ok()?;
            return Some(hours * 60);
        }
    }
    None
}

/// Strips the date/time/duration tokens `fallback_classify` already
/// matched out of the raw message, leaving whatever text remains as the
/// event title. Falls back to the untouched text if nothing survives.
fn extract_event_title(text: &str) -> String {
    const PATTERNS: [&str; 5] = [
        r"(?i)\btomorrow\b",
        r"(?i)\btoday\b",
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
        r"(?i)\b\d{1,2}(?::\d{2})?\s*(am|pm)\b",
        r"(?i)\b\d+[\s-]*(?:minute|min|hour|hr)s?\b",
    ];
    let mut cleaned = text.to_string();
    for pattern in PATTERNS {
        if let Ok(re) = Regex::new(pattern) {
            cleaned = re.replace_all(&cleaned, " ").to_string();
        }
    }
    let trimmed: String = cleaned
        .split_whitespace()
        .filter(|w| !matches!(w.to_lowercase().as_str(), "at" | "for" | "a" | "the" | "on"))
        .collect::<Vec<_>>()
        .join(" ");
    if trimmed.is_empty() {
        text.trim().to_string()
    } else {
        trimmed
    }
}

fn extract_priority(lowered: &str) -> Option<String> {
    for candidate in ["critical", "high", "medium", "low"] {
        if lowered.contains(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}

const STOPWORDS: [&str; 14] = [
    "the", "a", "an", "to", "for", "please", "task", "set", "change", "update", "mark", "as",
    "it", "that",
];

fn extract_task_keyword(text: &str) -> Option<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .filter(|token| token.len() >= 2 && !STOPWORDS.contains(token))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn fallback_classifies_meeting_note() {
        let text = "Meeting Notes:\nAlice: let's ship by Friday\nBob: sounds good";
        let action = Planner::fallback_classify(text, now());
        assert!(matches!(action, Action::RegisterMeetingNote { .. }));
    }

    #[test]
    fn fallback_classifies_create_task() {
        let action = Planner::fallback_classify("please add a task to write the report", now());
        assert!(matches!(action, Action::CreateTask { .. }));
    }

    #[test]
    fn fallback_classifies_complete_task() {
        let action = Planner::fallback_classify("mark the report task as done", now());
        assert!(matches!(action, Action::CompleteTask { .. }));
    }

    #[test]
    fn fallback_defaults_to_unknown() {
        let action = Planner::fallback_classify("how's the weather", now());
        assert!(matches!(action, Action::Unknown { .. }));
    }

    #[test]
    fn fallback_classifies_create_event_with_no_verb_cue() {
        let action = Planner::fallback_classify("tomorrow 10am 45-minute design review", now());
        match action {
            Action::CreateEvent { title, start, duration_minutes } => {
                assert_eq!(title, "design review");
                assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap());
                assert_eq!(duration_minutes, 45);
            }
            other => panic!("expected CreateEvent, got {other:?}"),
        }
    }

    #[test]
    fn fallback_classifies_move_event() {
        let action = Planner::fallback_classify("move the design review meeting to tomorrow 3pm", now());
        match action {
            Action::MoveEvent { start, .. } => {
                assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 2, 15, 0, 0).unwrap());
            }
            other => panic!("expected MoveEvent, got {other:?}"),
        }
    }

    #[test]
    fn fallback_classifies_delete_event() {
        let action = Planner::fallback_classify("cancel the design review meeting", now());
        assert!(matches!(action, Action::DeleteEvent { .. }));
    }

    #[test]
    fn hard_rules_keep_only_meeting_note_when_present() {
        let plan = Plan {
            actions: vec![
                Action::CreateTask { title: "x".into(), due: None, effort_minutes: None, priority: None },
                Action::RegisterMeetingNote { meeting_note: "notes".into() },
            ],
            note: None,
        };
        let enforced = Planner::enforce_hard_rules(plan);
        assert_eq!(enforced.actions.len(), 1);
        assert!(matches!(enforced.actions[0], Action::RegisterMeetingNote { .. }));
    }

    #[test]
    fn hard_rules_dedupe_singleton_intents() {
        let plan = Plan {
            actions: vec![
                Action::DeleteDuplicateTasks,
                Action::DeleteDuplicateTasks,
            ],
            note: None,
        };
        let enforced = Planner::enforce_hard_rules(plan);
        assert_eq!(enforced.actions.len(), 1);
    }

    #[test]
    fn hard_rules_cap_at_five_actions() {
        let plan = Plan {
            actions: (0..8)
                .map(|i| Action::CreateTask {
                    title: format!("task {i}"),
                    due: None,
                    effort_minutes: None,
                    priority: None,
                })
                .collect(),
            note: None,
        };
        let enforced = Planner::enforce_hard_rules(plan);
        assert_eq!(enforced.actions.len(), MAX_ACTIONS_PER_TURN);
    }
}

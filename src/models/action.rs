use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One intent the Planner may emit. A tagged union with one variant per
/// intent, per SPEC_FULL.md §9: fields not applicable to a variant are
/// absent, not nullable. The Planner's LLM JSON shape maps onto this
/// 1:1 via the `intent` discriminant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Action {
    CreateTask {
        title: String,
        #[serde(default)]
        due: Option<DateTime<Utc>>,
        #[serde(default)]
        effort_minutes: Option<i64>,
        #[serde(default)]
        priority: Option<String>,
    },
    CreateEvent {
        title: String,
        start: DateTime<Utc>,
        duration_minutes: i64,
    },
    UpdateTask {
        task_keyword: String,
        #[serde(default)]
        new_title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        due: Option<DateTime<Utc>>,
        #[serde(default)]
        effort_minutes: Option<i64>,
    },
    DeleteTask {
        task_keyword: String,
    },
    StartTask {
        task_keyword: String,
    },
    CompleteTask {
        task_keyword: String,
    },
    UpdatePriority {
        task_keyword: String,
        priority: String,
    },
    UpdateDue {
        task_keyword: String,
        due: DateTime<Utc>,
    },
    ListTasks {
        #[serde(default)]
        limit: Option<i64>,
    },
    ListEvents {
        #[serde(default)]
        target_date: Option<NaiveDate>,
        #[serde(default)]
        limit: Option<i64>,
    },
    FindFreeTime {
        #[serde(default)]
        target_date: Option<NaiveDate>,
        duration_minutes: i64,
    },
    MoveEvent {
        task_keyword: String,
        start: DateTime<Utc>,
        #[serde(default)]
        duration_minutes: Option<i64>,
    },
    DeleteEvent {
        task_keyword: String,
    },
    UpdateEvent {
        task_keyword: String,
        #[serde(default)]
        new_title: Option<String>,
        #[serde(default)]
        start: Option<DateTime<Utc>>,
        #[serde(default)]
        duration_minutes: Option<i64>,
    },
    RescheduleRequest {
        #[serde(default)]
        hint: Option<String>,
    },
    RescheduleAfterHour {
        cutoff_hour: u8,
    },
    DeleteDuplicateTasks,
    RegisterMeetingNote {
        meeting_note: String,
    },
    Unknown {
        #[serde(default)]
        note: Option<String>,
    },
}

impl Action {
    pub fn intent_name(&self) -> &'static str {
        match self {
            Action::CreateTask { .. } => "create_task",
            Action::CreateEvent { .. } => "create_event",
            Action::UpdateTask { .. } => "update_task",
            Action::DeleteTask { .. } => "delete_task",
            Action::StartTask { .. } => "start_task",
            Action::CompleteTask { .. } => "complete_task",
            Action::UpdatePriority { .. } => "update_priority",
            Action::UpdateDue { .. } => "update_due",
            Action::ListTasks { .. } => "list_tasks",
            Action::ListEvents { .. } => "list_events",
            Action::FindFreeTime { .. } => "find_free_time",
            Action::MoveEvent { .. } => "move_event",
            Action::DeleteEvent { .. } => "delete_event",
            Action::UpdateEvent { .. } => "update_event",
            Action::RescheduleRequest { .. } => "reschedule_request",
            Action::RescheduleAfterHour { .. } => "reschedule_after_hour",
            Action::DeleteDuplicateTasks => "delete_duplicate_tasks",
            Action::RegisterMeetingNote { .. } => "register_meeting_note",
            Action::Unknown { .. } => "unknown",
        }
    }

    /// Singleton intents from SPEC_FULL.md §4.7: at most one may appear per turn.
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            Action::RegisterMeetingNote { .. }
                | Action::RescheduleAfterHour { .. }
                | Action::DeleteDuplicateTasks
        )
    }

    /// Destructive/broad-effect intents that always route through a
    /// confirmation gate (§4.8 check 3), independent of autonomy level.
    pub fn always_confirms(&self) -> bool {
        matches!(
            self,
            Action::RescheduleAfterHour { .. } | Action::DeleteDuplicateTasks
        )
    }

    pub fn task_keyword(&self) -> Option<&str> {
        match self {
            Action::UpdateTask { task_keyword, .. }
            | Action::DeleteTask { task_keyword }
            | Action::StartTask { task_keyword }
            | Action::CompleteTask { task_keyword }
            | Action::UpdatePriority { task_keyword, .. }
            | Action::UpdateDue { task_keyword, .. }
            | Action::MoveEvent { task_keyword, .. }
            | Action::DeleteEvent { task_keyword }
            | Action::UpdateEvent { task_keyword, .. } => Some(task_keyword.as_str()),
            _ => None,
        }
    }
}

/// Output of the Planner: an ordered list of actions plus an optional note,
/// used as a clarifying question when no action is confident (SPEC_FULL.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Plan {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A single conversational turn, used both for bounded history input to the
/// Planner and for the assistant chat contract (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

/// Generic one-word task keywords rejected as targeting hints (§4.7).
const GENERIC_KEYWORDS: [&str; 4] = ["task", "meeting", "event", "thing"];

pub fn is_generic_keyword(keyword: &str) -> bool {
    let normalized = keyword.trim().to_lowercase();
    normalized.is_empty()
        || normalized.chars().count() < 2
        || GENERIC_KEYWORDS.contains(&normalized.as_str())
}

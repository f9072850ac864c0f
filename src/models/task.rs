use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUSES: [&str; 5] = ["todo", "in_progress", "done", "blocked", "canceled"];
pub const TERMINAL_STATUSES: [&str; 2] = ["done", "canceled"];
pub const PRIORITIES: [&str; 4] = ["low", "medium", "high", "critical"];
pub const SOURCES: [&str; 4] = ["manual", "meeting", "chat", "external"];

pub const MIN_EFFORT_MINUTES: i64 = 15;
pub const MAX_EFFORT_MINUTES: i64 = 480;

pub fn is_terminal(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

pub fn priority_rank(priority: &str) -> i32 {
    match priority {
        "critical" => 4,
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

pub fn status_rank(status: &str) -> i32 {
    match status {
        "in_progress" => 3,
        "todo" => 2,
        "blocked" => 1,
        "done" | "canceled" => 0,
        _ => 0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due: Option<DateTime<Utc>>,
    pub effort_minutes: i64,
    pub project_id: Option<String>,
    pub source: String,
    pub source_ref: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Late iff a due instant exists and is strictly before `now`, both
    /// compared as UTC instants (never naive-stripped; SPEC_FULL.md §9).
    pub fn is_late_at(&self, now: DateTime<Utc>) -> bool {
        self.due.map(|due| due < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreateInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effort_minutes: Option<i64>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_ref: Option<String>,
}

/// `Option<Option<T>>`: `None` means the field was absent (leave untouched),
/// `Some(None)` means the client explicitly cleared it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub effort_minutes: Option<i64>,
    #[serde(default)]
    pub project_id: Option<Option<String>>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

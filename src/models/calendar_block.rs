use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BLOCK_TYPES: [&str; 5] = ["task_block", "focus_block", "buffer", "personal", "other"];
pub const SOURCE_AAWO: &str = "aawo";
pub const SOURCE_EXTERNAL: &str = "external";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub task_id: Option<String>,
    pub locked: bool,
    pub source: String,
    pub external_event_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarBlock {
    pub fn is_external(&self) -> bool {
        self.source == SOURCE_EXTERNAL
    }

    /// Half-open overlap: `[a.start, a.end) ∩ [b.start, b.end) ≠ ∅`.
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start < other_end && other_start < self.end
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBlockCreateInput {
    #[serde(default = "default_block_type")]
    pub kind: String,
    #[serde(default = "default_block_title")]
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

fn default_block_type() -> String {
    "task_block".to_string()
}

fn default_block_title() -> String {
    "Focused Work".to_string()
}

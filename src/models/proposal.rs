use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const PROPOSAL_STATUSES: [&str; 3] = ["draft", "applied", "rejected"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Stable,
    Urgent,
    Focus,
}

impl Strategy {
    /// Fixed ordering per SPEC_FULL.md §4.4: strategies are tried in this
    /// order and truncated to `max_proposals`.
    pub const ORDER: [Strategy; 3] = [Strategy::Stable, Strategy::Urgent, Strategy::Focus];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Stable => "stable",
            Strategy::Urgent => "urgent",
            Strategy::Focus => "focus",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingChange {
    pub id: String,
    pub kind: String,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingProposal {
    pub id: String,
    pub summary: String,
    pub explanation: JsonValue,
    pub score: JsonValue,
    pub status: String,
    pub horizon_from: Option<DateTime<Utc>>,
    pub horizon_to: Option<DateTime<Utc>>,
    pub changes: Vec<SchedulingChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a `create_block` change (§4.4 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProposalScore {
    pub lateness_minutes: f64,
    pub deep_work_minutes: f64,
    pub changes_count: i64,
    pub objective_value: f64,
}

impl ProposalScore {
    pub fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "latenessMinutes": self.lateness_minutes,
            "deepWorkMinutes": self.deep_work_minutes,
            "changesCount": self.changes_count,
            "objectiveValue": self.objective_value,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub created_blocks: Vec<crate::models::calendar_block::CalendarBlock>,
    /// Always empty today; reserved for future `move_block` changes
    /// (SPEC_FULL.md §9, resolved open question).
    pub updated_blocks: Vec<crate::models::calendar_block::CalendarBlock>,
    pub skipped: i64,
}

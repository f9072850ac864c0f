use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EXTRACTION_STATUSES: [&str; 3] = ["pending", "completed", "failed"];
pub const CANDIDATE_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptUtterance {
    pub ts_ms: i64,
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub title: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub transcript: Vec<TranscriptUtterance>,
    pub extraction_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingIngestInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    pub transcript: Vec<TranscriptUtterance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionItemCandidate {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub assignee_name: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub effort_minutes: i64,
    pub confidence: f64,
    pub rationale: Option<String>,
    pub status: String,
    pub linked_task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Automatic-approval threshold from SPEC_FULL.md §4.6: a candidate this
/// confident and this small may become a Task without a human confirmation
/// gate.
pub fn is_auto_approvable(confidence: f64, effort_minutes: i64) -> bool {
    confidence >= 0.75 && effort_minutes < 240
}

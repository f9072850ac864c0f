use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::action::Action;

pub const APPROVAL_TYPES: [&str; 5] = [
    "action_item",
    "reschedule",
    "chat_pending_action",
    "chat_clarification",
    "other",
];
pub const APPROVAL_STATUSES: [&str; 3] = ["pending", "approved", "rejected"];

/// The core only ever reads a small typed subset of the (opaque-in-source)
/// approval payload (SPEC_FULL.md §9); modeled as a sum type tagged by the
/// ApprovalRequest's `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalPayload {
    ActionItem {
        candidate_id: String,
    },
    Reschedule {
        proposal_id: String,
    },
    ChatPendingAction {
        action: Action,
        source_message: String,
    },
    ChatClarification {
        question: String,
        original_message: String,
    },
    Other {
        detail: String,
    },
}

impl ApprovalPayload {
    pub fn approval_type(&self) -> &'static str {
        match self {
            ApprovalPayload::ActionItem { .. } => "action_item",
            ApprovalPayload::Reschedule { .. } => "reschedule",
            ApprovalPayload::ChatPendingAction { .. } => "chat_pending_action",
            ApprovalPayload::ChatClarification { .. } => "chat_clarification",
            ApprovalPayload::Other { .. } => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub approval_type: String,
    pub status: String,
    pub payload: ApprovalPayload,
    pub reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Invariant from SPEC_FULL.md §8: `status==pending ⇔ resolved_at is null`.
    pub fn invariant_holds(&self) -> bool {
        (self.status == "pending") == self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn resulting_status(self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approved",
            ApprovalDecision::Reject => "rejected",
        }
    }
}

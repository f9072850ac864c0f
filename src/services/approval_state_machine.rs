use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::db::repositories::approval_repository::ApprovalRepository;
use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::meeting_repository::ActionItemCandidateRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::error::{AppError, AppResult};
use crate::models::action::{Action, Plan};
use crate::models::approval::{ApprovalDecision, ApprovalPayload, ApprovalRequest};
use crate::models::profile::Profile;
use crate::models::task::Task;
use crate::services::calendar_mirror::CalendarMirror;
use crate::services::executor::{ExecutionOutcome, Executor};
use crate::services::llm_client::LlmClient;
use crate::services::proposal_applier::ProposalApplier;

/// Approval types a bare chat affirmative/negative may resolve.
/// `chat_clarification` is deliberately excluded: it is resolved either by
/// the user supplying the missing information (routed back through the
/// Planner) or by supersession, never by a plain yes/no.
const CHAT_RESOLVABLE_TYPES: [&str; 3] = ["chat_pending_action", "reschedule", "action_item"];

enum Sentiment {
    Affirmative,
    Negative,
}

const AFFIRMATIVE_PHRASES: [&str; 9] = [
    "yes", "yep", "yeah", "sure", "confirm", "ok", "okay", "go ahead", "do it",
];
const NEGATIVE_PHRASES: [&str; 6] = ["no", "nope", "cancel", "don't", "stop", "never mind"];

fn classify_sentiment(message: &str) -> Option<Sentiment> {
    let normalized = message
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    if AFFIRMATIVE_PHRASES.contains(&normalized.as_str()) {
        Some(Sentiment::Affirmative)
    } else if NEGATIVE_PHRASES.contains(&normalized.as_str()) {
        Some(Sentiment::Negative)
    } else {
        None
    }
}

pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    /// Explicit endpoint: approve/reject a specific request by id (§6's
    /// `action-items/{id}/(approve|reject)` and `approvals/{id}/resolve`).
    /// `pending -> {approved, rejected}` is terminal; resolving twice fails.
    pub fn resolve_explicit(
        conn: &Connection,
        id: &str,
        decision: ApprovalDecision,
        reason: Option<&str>,
    ) -> AppResult<ApprovalRequest> {
        let request = ApprovalRepository::find_by_id(conn, id)?;
        if request.status != "pending" {
            return Err(AppError::conflict(format!("approval request {id} is not pending")));
        }
        ApprovalRepository::resolve(conn, id, decision.resulting_status(), reason)?;
        ApprovalRepository::find_by_id(conn, id)
    }

    /// Chat resolution (§4.9): when `message` is purely affirmative or
    /// negative, resolves the latest pending chat-resolvable request.
    /// Returns `None` if the message isn't a bare yes/no, or if there is
    /// nothing pending to resolve — callers should fall through to the
    /// normal Planner/Executor path in either case.
    pub async fn resolve_from_chat(
        conn: &mut Connection,
        llm: Option<&LlmClient>,
        mirror: Option<&CalendarMirror>,
        profile: &Profile,
        message: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExecutionOutcome>> {
        let Some(sentiment) = classify_sentiment(message) else {
            return Ok(None);
        };
        let Some(pending) = ApprovalRepository::latest_pending_any(conn, &CHAT_RESOLVABLE_TYPES)? else {
            return Ok(None);
        };

        match sentiment {
            Sentiment::Affirmative => Self::approve(conn, llm, mirror, profile, pending, now)
                .await
                .map(Some),
            Sentiment::Negative => {
                ApprovalRepository::resolve(conn, &pending.id, "rejected", Some("rejected_by_chat"))?;
                AuditRepository::record(conn, "reject_approval", "user", Some(&pending.id), &json!({}))?;
                Ok(Some(ExecutionOutcome {
                    reply: "Okay, I won't do that.".to_string(),
                    refresh: vec!["approvals".to_string()],
                    approval_id: Some(pending.id),
                }))
            }
        }
    }

    async fn approve(
        conn: &mut Connection,
        llm: Option<&LlmClient>,
        mirror: Option<&CalendarMirror>,
        profile: &Profile,
        request: ApprovalRequest,
        now: DateTime<Utc>,
    ) -> AppResult<ExecutionOutcome> {
        ApprovalRepository::resolve(conn, &request.id, "approved", None)?;
        AuditRepository::record(conn, "approve_approval", "user", Some(&request.id), &json!({}))?;

        match request.payload {
            ApprovalPayload::ChatPendingAction { action, .. } => {
                // Confirmation is suppressed here: the gate in Executor::execute
                // already ran when the action was first queued, so we dispatch
                // straight to the handler.
                Executor::dispatch(conn, llm, mirror, profile, action, now).await
            }
            ApprovalPayload::Reschedule { proposal_id } => {
                let outcome = ProposalApplier::apply(conn, &proposal_id)?;
                AuditRepository::record(
                    conn,
                    "approve_reschedule",
                    "user",
                    Some(&proposal_id),
                    &json!({"created_blocks": outcome.created_blocks.len()}),
                )?;
                Ok(ExecutionOutcome {
                    reply: format!("Applied the reschedule, placing {} block(s).", outcome.created_blocks.len()),
                    refresh: vec!["tasks".to_string(), "calendar".to_string()],
                    approval_id: Some(request.id),
                })
            }
            ApprovalPayload::ActionItem { candidate_id } => {
                let candidate = ActionItemCandidateRepository::find_by_id(conn, &candidate_id)?;
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
                    source_ref: Some(candidate.meeting_id.clone()),
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                TaskRepository::insert(conn, &task)?;
                ActionItemCandidateRepository::update_status_and_link(conn, &candidate_id, "approved", Some(&task.id))?;
                AuditRepository::record(conn, "approve_action_item", "user", Some(&candidate_id), &json!({}))?;
                Ok(ExecutionOutcome {
                    reply: format!("Created task \"{}\".", task.title),
                    refresh: vec!["tasks".to_string()],
                    approval_id: Some(request.id),
                })
            }
            ApprovalPayload::ChatClarification { .. } => Ok(ExecutionOutcome {
                reply: "Noted.".to_string(),
                refresh: vec![],
                approval_id: Some(request.id),
            }),
            ApprovalPayload::Other { detail } => Ok(ExecutionOutcome {
                reply: detail,
                refresh: vec![],
                approval_id: Some(request.id),
            }),
        }
    }

    /// Clarification supersession (§4.9): if a `chat_clarification` is
    /// pending and the newly planned turn resolves to at least one concrete
    /// action, the stale clarification is auto-rejected rather than left
    /// stranded.
    pub fn supersede_clarification_if_needed(conn: &Connection, plan: &Plan) -> AppResult<()> {
        let has_concrete_action = plan.actions.iter().any(|a| !matches!(a, Action::Unknown { .. }));
        if !has_concrete_action {
            return Ok(());
        }
        if let Some(pending) = ApprovalRepository::latest_pending_by_type(conn, "chat_clarification")? {
            ApprovalRepository::resolve(
                conn,
                &pending.id,
                "rejected",
                Some("clarification_superseded_by_new_command"),
            )?;
            AuditRepository::record(
                conn,
                "supersede_clarification",
                "system",
                Some(&pending.id),
                &json!({}),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_sentiment_recognizes_affirmative() {
        assert!(matches!(classify_sentiment("Yes!"), Some(Sentiment::Affirmative)));
        assert!(matches!(classify_sentiment("go ahead"), Some(Sentiment::Affirmative)));
    }

    #[test]
    fn classify_sentiment_recognizes_negative() {
        assert!(matches!(classify_sentiment("no"), Some(Sentiment::Negative)));
        assert!(matches!(classify_sentiment("Cancel."), Some(Sentiment::Negative)));
    }

    #[test]
    fn classify_sentiment_ignores_freeform_text() {
        assert!(classify_sentiment("move my 3pm meeting to 4pm").is_none());
    }

    #[test]
    fn supersede_requires_a_concrete_action() {
        let plan = Plan {
            actions: vec![Action::Unknown { note: None }],
            note: None,
        };
        assert!(!plan.actions.iter().any(|a| !matches!(a, Action::Unknown { .. })));
    }
}

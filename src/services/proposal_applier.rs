use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::db::repositories::audit_repository::AuditRepository;
use crate::db::repositories::calendar_block_repository::CalendarBlockRepository;
use crate::db::repositories::proposal_repository::ProposalRepository;
use crate::error::{AppError, AppResult};
use crate::models::calendar_block::{CalendarBlock, SOURCE_AAWO};
use crate::models::proposal::{ApplyOutcome, CreateBlockPayload};
use rusqlite::Connection;

pub struct ProposalApplier;

impl ProposalApplier {
    /// Authoritatively rechecks every `create_block` change against the live
    /// calendar (a slot may have been taken since the proposal was drawn up),
    /// silently skips conflicts, and commits the rest as new `aawo` blocks.
    /// Applying a non-draft proposal fails with `Conflict`.
    pub fn apply(conn: &Connection, proposal_id: &str) -> AppResult<ApplyOutcome> {
        let proposal = ProposalRepository::find_by_id(conn, proposal_id)?;
        if proposal.status != "draft" {
            return Err(AppError::conflict(format!(
                "proposal {proposal_id} is not in draft status"
            )));
        }

        let mut outcome = ApplyOutcome::default();
        for change in &proposal.changes {
            if change.kind != "create_block" {
                continue;
            }
            let payload: CreateBlockPayload = serde_json::from_value(change.payload.clone())?;
            let conflicts = CalendarBlockRepository::list_intersecting(conn, payload.start, payload.end)?;
            if !conflicts.is_empty() {
                outcome.skipped += 1;
                continue;
            }

            let now = Utc::now();
            let block = CalendarBlock {
                id: Uuid::new_v4().to_string(),
                kind: payload.kind,
                title: payload.title,
                start: payload.start,
                end: payload.end,
                task_id: payload.task_id,
                locked: false,
                source: SOURCE_AAWO.to_string(),
                external_event_id: None,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            CalendarBlockRepository::insert(conn, &block)?;
            AuditRepository::record(
                conn,
                "proposal_block_applied",
                "assistant",
                Some(&block.id),
                &json!({"proposal_id": proposal_id, "task_id": block.task_id}),
            )?;
            outcome.created_blocks.push(block);
        }

        ProposalRepository::update_status(conn, proposal_id, "applied")?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use crate::models::proposal::{ProposalScore, SchedulingChange, SchedulingProposal};
    use tempfile::tempdir;

    fn proposal_with_one_change(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> SchedulingProposal {
        let now = Utc::now();
        let payload = CreateBlockPayload {
            kind: "task_block".to_string(),
            title: "Write draft".to_string(),
            start,
            end,
            task_id: None,
        };
        SchedulingProposal {
            id: Uuid::new_v4().to_string(),
            summary: "test".to_string(),
            explanation: serde_json::json!({}),
            score: ProposalScore::default().to_json(),
            status: "draft".to_string(),
            horizon_from: Some(start),
            horizon_to: Some(end),
            changes: vec![SchedulingChange {
                id: Uuid::new_v4().to_string(),
                kind: "create_block".to_string(),
                payload: serde_json::to_value(&payload).unwrap(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn apply_commits_non_conflicting_blocks_and_marks_applied() {
        let dir = tempdir().unwrap();
        let pool = DbPool::new(dir.path().join("db.sqlite")).unwrap();
        let start = Utc::now();
        let end = start + chrono::Duration::minutes(30);
        let proposal = proposal_with_one_change(start, end);
        let proposal_id = proposal.id.clone();

        pool.with_connection_mut(|conn| {
            ProposalRepository::insert_with_changes(conn, &proposal)
        })
        .unwrap();

        let outcome = pool
            .with_connection(|conn| ProposalApplier::apply(conn, &proposal_id))
            .unwrap();
        assert_eq!(outcome.created_blocks.len(), 1);
        assert_eq!(outcome.skipped, 0);

        let reloaded = pool
            .with_connection(|conn| ProposalRepository::find_by_id(conn, &proposal_id))
            .unwrap();
        assert_eq!(reloaded.status, "applied");
    }

    #[test]
    fn apply_rejects_non_draft_proposal() {
        let dir = tempdir().unwrap();
        let pool = DbPool::new(dir.path().join("db.sqlite")).unwrap();
        let start = Utc::now();
        let end = start + chrono::Duration::minutes(30);
        let mut proposal = proposal_with_one_change(start, end);
        proposal.status = "applied".to_string();
        let proposal_id = proposal.id.clone();

        pool.with_connection_mut(|conn| {
            ProposalRepository::insert_with_changes(conn, &proposal)
        })
        .unwrap();

        let result = pool.with_connection(|conn| ProposalApplier::apply(conn, &proposal_id));
        assert!(result.is_err());
    }
}

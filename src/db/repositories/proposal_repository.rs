use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::proposal::{SchedulingChange, SchedulingProposal};

const PROPOSAL_SELECT: &str = "SELECT id, summary, explanation, score, status, horizon_from, \
    horizon_to, created_at, updated_at FROM scheduling_proposals";

const CHANGE_SELECT: &str =
    "SELECT id, proposal_id, kind, payload FROM scheduling_changes WHERE proposal_id = ?1 ORDER BY id";

pub struct ProposalRepository;

impl ProposalRepository {
    /// Inserts a proposal and its changes in one transaction, matching the
    /// all-or-nothing semantics the Scheduler assumes when it builds a draft.
    pub fn insert_with_changes(
        conn: &mut Connection,
        proposal: &SchedulingProposal,
    ) -> AppResult<()> {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO scheduling_proposals (id, summary, explanation, score, status, \
                horizon_from, horizon_to, created_at, updated_at) \
             VALUES (:id, :summary, :explanation, :score, :status, :horizon_from, :horizon_to, \
                :created_at, :updated_at)",
            named_params! {
                ":id": proposal.id,
                ":summary": proposal.summary,
                ":explanation": serde_json::to_string(&proposal.explanation)?,
                ":score": serde_json::to_string(&proposal.score)?,
                ":status": proposal.status,
                ":horizon_from": proposal.horizon_from.map(|d| d.to_rfc3339()),
                ":horizon_to": proposal.horizon_to.map(|d| d.to_rfc3339()),
                ":created_at": proposal.created_at.to_rfc3339(),
                ":updated_at": proposal.updated_at.to_rfc3339(),
            },
        )?;
        for change in &proposal.changes {
            tx.execute(
                "INSERT INTO scheduling_changes (id, proposal_id, kind, payload, created_at) \
                 VALUES (:id, :proposal_id, :kind, :payload, :created_at)",
                named_params! {
                    ":id": change.id,
                    ":proposal_id": proposal.id,
                    ":kind": change.kind,
                    ":payload": serde_json::to_string(&change.payload)?,
                    ":created_at": proposal.created_at.to_rfc3339(),
                },
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<SchedulingProposal> {
        let sql = format!("{PROPOSAL_SELECT} WHERE id = ?1");
        let mut proposal = conn.query_row(&sql, [id], row_to_proposal)?;
        proposal.changes = Self::list_changes(conn, id)?;
        Ok(proposal)
    }

    fn list_changes(conn: &Connection, proposal_id: &str) -> AppResult<Vec<SchedulingChange>> {
        let mut stmt = conn.prepare(CHANGE_SELECT)?;
        let rows = stmt.query_map([proposal_id], row_to_change)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn update_status(conn: &Connection, id: &str, status: &str) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE scheduling_proposals SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, status, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "scheduling proposal {id} not found"
            )));
        }
        Ok(())
    }

    pub fn list_recent(conn: &Connection, limit: i64) -> AppResult<Vec<SchedulingProposal>> {
        let sql = format!("{PROPOSAL_SELECT} ORDER BY created_at DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], row_to_proposal)?;
        let mut out = Vec::new();
        for row in rows {
            let mut proposal = row?;
            proposal.changes = Self::list_changes(conn, &proposal.id)?;
            out.push(proposal);
        }
        Ok(out)
    }
}

fn row_to_proposal(row: &Row<'_>) -> rusqlite::Result<SchedulingProposal> {
    let explanation_json: String = row.get("explanation")?;
    let score_json: String = row.get("score")?;
    let horizon_from: Option<String> = row.get("horizon_from")?;
    let horizon_to: Option<String> = row.get("horizon_to")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(SchedulingProposal {
        id: row.get("id")?,
        summary: row.get("summary")?,
        explanation: serde_json::from_str(&explanation_json).unwrap_or(serde_json::Value::Null),
        score: serde_json::from_str(&score_json).unwrap_or(serde_json::Value::Null),
        status: row.get("status")?,
        horizon_from: horizon_from.map(|d| parse_rfc3339(&d)),
        horizon_to: horizon_to.map(|d| parse_rfc3339(&d)),
        changes: Vec::new(),
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<SchedulingChange> {
    let payload_json: String = row.get("payload")?;
    Ok(SchedulingChange {
        id: row.get("id")?,
        kind: row.get("kind")?,
        payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

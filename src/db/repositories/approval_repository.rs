use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::approval::{ApprovalPayload, ApprovalRequest};

const BASE_SELECT: &str = "SELECT id, type, status, payload, reason, resolved_at, \
    created_at, updated_at FROM approval_requests";

pub struct ApprovalRepository;

impl ApprovalRepository {
    pub fn insert(conn: &Connection, request: &ApprovalRequest) -> AppResult<()> {
        conn.execute(
            "INSERT INTO approval_requests (id, type, status, payload, reason, resolved_at, \
                created_at, updated_at) \
             VALUES (:id, :type, :status, :payload, :reason, :resolved_at, :created_at, :updated_at)",
            named_params! {
                ":id": request.id,
                ":type": request.approval_type,
                ":status": request.status,
                ":payload": serde_json::to_string(&request.payload)?,
                ":reason": request.reason,
                ":resolved_at": request.resolved_at.map(|d| d.to_rfc3339()),
                ":created_at": request.created_at.to_rfc3339(),
                ":updated_at": request.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<ApprovalRequest> {
        let sql = format!("{BASE_SELECT} WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_request)?)
    }

    /// Resolves a request in place, recording the terminal status, optional
    /// rejection reason, and `resolved_at` timestamp (SPEC_FULL.md §8
    /// invariant: status==pending iff resolved_at is null).
    pub fn resolve(
        conn: &Connection,
        id: &str,
        status: &str,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let now = Utc::now();
        let affected = conn.execute(
            "UPDATE approval_requests SET status = :status, reason = :reason, \
                resolved_at = :resolved_at, updated_at = :updated_at WHERE id = :id",
            named_params! {
                ":id": id,
                ":status": status,
                ":reason": reason,
                ":resolved_at": now.to_rfc3339(),
                ":updated_at": now.to_rfc3339(),
            },
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "approval request {id} not found"
            )));
        }
        Ok(())
    }

    pub fn list_pending(conn: &Connection) -> AppResult<Vec<ApprovalRequest>> {
        let sql = format!("{BASE_SELECT} WHERE status = 'pending' ORDER BY created_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_request)?;
        collect(rows)
    }

    /// Most recent pending approval of a given type, used to resolve bare
    /// chat affirmatives/negatives against the latest open question.
    pub fn latest_pending_by_type(
        conn: &Connection,
        approval_type: &str,
    ) -> AppResult<Option<ApprovalRequest>> {
        let sql = format!(
            "{BASE_SELECT} WHERE status = 'pending' AND type = ?1 ORDER BY created_at DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([approval_type], row_to_request)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recent pending approval of any of the given types, used when a
    /// chat reply could resolve either a pending action or a clarification.
    pub fn latest_pending_any(
        conn: &Connection,
        approval_types: &[&str],
    ) -> AppResult<Option<ApprovalRequest>> {
        if approval_types.is_empty() {
            return Ok(None);
        }
        let placeholders = approval_types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "{BASE_SELECT} WHERE status = 'pending' AND type IN ({placeholders}) \
             ORDER BY created_at DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = approval_types
            .iter()
            .map(|t| t as &dyn rusqlite::ToSql)
            .collect();
        let mut rows = stmt.query_map(params.as_slice(), row_to_request)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    let payload_json: String = row.get("payload")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let payload: ApprovalPayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ApprovalRequest {
        id: row.get("id")?,
        approval_type: row.get("type")?,
        status: row.get("status")?,
        payload,
        reason: row.get("reason")?,
        resolved_at: resolved_at.map(|d| parse_rfc3339(&d)),
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn collect<I>(rows: I) -> AppResult<Vec<ApprovalRequest>>
where
    I: Iterator<Item = rusqlite::Result<ApprovalRequest>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

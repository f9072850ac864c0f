use rusqlite::{named_params, Connection};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::AppResult;

/// Append-only log of every mutating command (SPEC_FULL.md §1.2): there is
/// no update or delete path, only `record`.
pub struct AuditRepository;

impl AuditRepository {
    pub fn record(
        conn: &Connection,
        action: &str,
        actor: &str,
        object_ref: Option<&str>,
        meta: &JsonValue,
    ) -> AppResult<()> {
        conn.execute(
            "INSERT INTO audit_logs (id, action, actor, object_ref, meta, created_at) \
             VALUES (:id, :action, :actor, :object_ref, :meta, :created_at)",
            named_params! {
                ":id": Uuid::new_v4().to_string(),
                ":action": action,
                ":actor": actor,
                ":object_ref": object_ref,
                ":meta": serde_json::to_string(meta)?,
                ":created_at": chrono::Utc::now().to_rfc3339(),
            },
        )?;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::sync_status::SyncStatus;

pub struct SyncStatusRepository;

impl SyncStatusRepository {
    pub fn get(conn: &Connection) -> AppResult<SyncStatus> {
        let sql = "SELECT connected, last_success_at, last_throttle_at, recent_throttle_count, \
            updated_at FROM sync_status WHERE id = 1";
        Ok(conn.query_row(sql, [], row_to_status)?)
    }

    pub fn update(conn: &Connection, status: &SyncStatus) -> AppResult<()> {
        conn.execute(
            "UPDATE sync_status SET connected = :connected, last_success_at = :last_success_at, \
                last_throttle_at = :last_throttle_at, recent_throttle_count = :recent_throttle_count, \
                updated_at = :updated_at WHERE id = 1",
            named_params! {
                ":connected": status.connected,
                ":last_success_at": status.last_success_at.map(|d| d.to_rfc3339()),
                ":last_throttle_at": status.last_throttle_at.map(|d| d.to_rfc3339()),
                ":recent_throttle_count": status.recent_throttle_count,
                ":updated_at": status.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }
}

fn row_to_status(row: &Row<'_>) -> rusqlite::Result<SyncStatus> {
    let last_success_at: Option<String> = row.get("last_success_at")?;
    let last_throttle_at: Option<String> = row.get("last_throttle_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(SyncStatus {
        connected: row.get("connected")?,
        last_success_at: last_success_at.map(|d| parse_rfc3339(&d)),
        last_throttle_at: last_throttle_at.map(|d| parse_rfc3339(&d)),
        recent_throttle_count: row.get("recent_throttle_count")?,
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

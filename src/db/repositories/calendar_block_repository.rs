use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::calendar_block::CalendarBlock;

const BASE_SELECT: &str = "SELECT id, type, title, start_at, end_at, task_id, locked, source, \
    external_event_id, version, created_at, updated_at FROM calendar_blocks";

pub struct CalendarBlockRepository;

impl CalendarBlockRepository {
    pub fn insert(conn: &Connection, block: &CalendarBlock) -> AppResult<()> {
        conn.execute(
            "INSERT INTO calendar_blocks (id, type, title, start_at, end_at, task_id, locked, \
                source, external_event_id, version, created_at, updated_at) \
             VALUES (:id, :type, :title, :start_at, :end_at, :task_id, :locked, \
                :source, :external_event_id, :version, :created_at, :updated_at)",
            named_params! {
                ":id": block.id,
                ":type": block.kind,
                ":title": block.title,
                ":start_at": block.start.to_rfc3339(),
                ":end_at": block.end.to_rfc3339(),
                ":task_id": block.task_id,
                ":locked": block.locked,
                ":source": block.source,
                ":external_event_id": block.external_event_id,
                ":version": block.version,
                ":created_at": block.created_at.to_rfc3339(),
                ":updated_at": block.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, block: &CalendarBlock) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE calendar_blocks SET type = :type, title = :title, start_at = :start_at, \
                end_at = :end_at, task_id = :task_id, locked = :locked, source = :source, \
                external_event_id = :external_event_id, version = :version, updated_at = :updated_at \
             WHERE id = :id",
            named_params! {
                ":id": block.id,
                ":type": block.kind,
                ":title": block.title,
                ":start_at": block.start.to_rfc3339(),
                ":end_at": block.end.to_rfc3339(),
                ":task_id": block.task_id,
                ":locked": block.locked,
                ":source": block.source,
                ":external_event_id": block.external_event_id,
                ":version": block.version,
                ":updated_at": block.updated_at.to_rfc3339(),
            },
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "calendar block {} not found",
                block.id
            )));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM calendar_blocks WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "calendar block {id} not found"
            )));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<CalendarBlock> {
        let sql = format!("{BASE_SELECT} WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_block)?)
    }

    /// All blocks (any source) overlapping `[from, to)`, used by the free-slot
    /// finder and by overlap rechecks before committing a proposal.
    pub fn list_intersecting(
        conn: &Connection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarBlock>> {
        let sql = format!("{BASE_SELECT} WHERE start_at < ?2 AND end_at > ?1 ORDER BY start_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([from.to_rfc3339(), to.to_rfc3339()], row_to_block)?;
        collect(rows)
    }

    /// Future non-external blocks, used to find reschedulable blocks for
    /// `reschedule_after_hour`.
    pub fn list_future_non_external(
        conn: &Connection,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarBlock>> {
        let sql = format!(
            "{BASE_SELECT} WHERE start_at >= ?1 AND source != 'external' ORDER BY start_at"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_block)?;
        collect(rows)
    }

    pub fn list_by_task(conn: &Connection, task_id: &str) -> AppResult<Vec<CalendarBlock>> {
        let sql = format!("{BASE_SELECT} WHERE task_id = ?1 ORDER BY start_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([task_id], row_to_block)?;
        collect(rows)
    }

    /// Detaches any blocks pointing at a task that is about to be deleted,
    /// matching the `ON DELETE SET NULL` contract at the application layer
    /// for callers that need the affected ids back.
    pub fn detach_task(conn: &Connection, task_id: &str) -> AppResult<()> {
        conn.execute(
            "UPDATE calendar_blocks SET task_id = NULL WHERE task_id = ?1",
            [task_id],
        )?;
        Ok(())
    }

    /// Re-parents blocks from a duplicate task onto its canonical survivor,
    /// used by `delete_duplicate_tasks`.
    pub fn reparent(conn: &Connection, from_task_id: &str, to_task_id: &str) -> AppResult<()> {
        conn.execute(
            "UPDATE calendar_blocks SET task_id = ?2 WHERE task_id = ?1",
            [from_task_id, to_task_id],
        )?;
        Ok(())
    }
}

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<CalendarBlock> {
    let start_at: String = row.get("start_at")?;
    let end_at: String = row.get("end_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(CalendarBlock {
        id: row.get("id")?,
        kind: row.get("type")?,
        title: row.get("title")?,
        start: parse_rfc3339(&start_at),
        end: parse_rfc3339(&end_at),
        task_id: row.get("task_id")?,
        locked: row.get("locked")?,
        source: row.get("source")?,
        external_event_id: row.get("external_event_id")?,
        version: row.get("version")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn collect<I>(rows: I) -> AppResult<Vec<CalendarBlock>>
where
    I: Iterator<Item = rusqlite::Result<CalendarBlock>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

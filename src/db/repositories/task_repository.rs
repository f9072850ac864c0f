use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::task::Task;

const BASE_SELECT: &str = "SELECT id, title, description, status, priority, due, \
    effort_minutes, project_id, source, source_ref, version, created_at, updated_at \
    FROM tasks";

pub struct TaskRepository;

impl TaskRepository {
    pub fn insert(conn: &Connection, task: &Task) -> AppResult<()> {
        conn.execute(
            "INSERT INTO tasks (id, title, description, status, priority, due, \
                effort_minutes, project_id, source, source_ref, version, created_at, updated_at) \
             VALUES (:id, :title, :description, :status, :priority, :due, \
                :effort_minutes, :project_id, :source, :source_ref, :version, :created_at, :updated_at)",
            named_params! {
                ":id": task.id,
                ":title": task.title,
                ":description": task.description,
                ":status": task.status,
                ":priority": task.priority,
                ":due": task.due.map(|d| d.to_rfc3339()),
                ":effort_minutes": task.effort_minutes,
                ":project_id": task.project_id,
                ":source": task.source,
                ":source_ref": task.source_ref,
                ":version": task.version,
                ":created_at": task.created_at.to_rfc3339(),
                ":updated_at": task.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn update(conn: &Connection, task: &Task) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE tasks SET title = :title, description = :description, status = :status, \
                priority = :priority, due = :due, effort_minutes = :effort_minutes, \
                project_id = :project_id, source = :source, source_ref = :source_ref, \
                version = :version, updated_at = :updated_at \
             WHERE id = :id",
            named_params! {
                ":id": task.id,
                ":title": task.title,
                ":description": task.description,
                ":status": task.status,
                ":priority": task.priority,
                ":due": task.due.map(|d| d.to_rfc3339()),
                ":effort_minutes": task.effort_minutes,
                ":project_id": task.project_id,
                ":source": task.source,
                ":source_ref": task.source_ref,
                ":version": task.version,
                ":updated_at": task.updated_at.to_rfc3339(),
            },
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "task {} not found",
                task.id
            )));
        }
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "task {id} not found"
            )));
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Task> {
        let sql = format!("{BASE_SELECT} WHERE id = ?1");
        let task = conn.query_row(&sql, [id], row_to_task)?;
        Ok(task)
    }

    pub fn list_all(conn: &Connection) -> AppResult<Vec<Task>> {
        let mut stmt = conn.prepare(&format!("{BASE_SELECT} ORDER BY updated_at DESC"))?;
        let rows = stmt.query_map([], row_to_task)?;
        collect(rows)
    }

    /// Candidate tasks for implicit scheduling: every non-terminal status.
    pub fn list_non_terminal(conn: &Connection) -> AppResult<Vec<Task>> {
        let sql = format!(
            "{BASE_SELECT} WHERE status NOT IN ('done', 'canceled') ORDER BY updated_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;
        collect(rows)
    }

    pub fn list_by_ids(conn: &Connection, ids: &[String]) -> AppResult<Vec<Task>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("{BASE_SELECT} WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_task)?;
        collect(rows)
    }

    pub fn list_non_canceled(conn: &Connection) -> AppResult<Vec<Task>> {
        let sql = format!("{BASE_SELECT} WHERE status != 'canceled' ORDER BY updated_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;
        collect(rows)
    }

    pub fn list_recent(conn: &Connection, limit: i64) -> AppResult<Vec<Task>> {
        let sql = format!("{BASE_SELECT} ORDER BY updated_at DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], row_to_task)?;
        collect(rows)
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let due: Option<String> = row.get("due")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        due: due.map(|d| parse_rfc3339(&d)),
        effort_minutes: row.get("effort_minutes")?,
        project_id: row.get("project_id")?,
        source: row.get("source")?,
        source_ref: row.get("source_ref")?,
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

fn collect<I>(rows: I) -> AppResult<Vec<Task>>
where
    I: Iterator<Item = rusqlite::Result<Task>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

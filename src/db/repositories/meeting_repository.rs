use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, Row};

use crate::error::AppResult;
use crate::models::meeting::{ActionItemCandidate, Meeting, TranscriptUtterance};

const MEETING_SELECT: &str = "SELECT id, title, started_at, ended_at, summary, transcript, \
    extraction_status, created_at, updated_at FROM meetings";

const CANDIDATE_SELECT: &str = "SELECT id, meeting_id, title, assignee_name, due, \
    effort_minutes, confidence, rationale, status, linked_task_id, created_at, updated_at \
    FROM action_item_candidates";

pub struct MeetingRepository;

impl MeetingRepository {
    pub fn insert(conn: &Connection, meeting: &Meeting) -> AppResult<()> {
        conn.execute(
            "INSERT INTO meetings (id, title, started_at, ended_at, summary, transcript, \
                extraction_status, created_at, updated_at) \
             VALUES (:id, :title, :started_at, :ended_at, :summary, :transcript, \
                :extraction_status, :created_at, :updated_at)",
            named_params! {
                ":id": meeting.id,
                ":title": meeting.title,
                ":started_at": meeting.started_at.map(|d| d.to_rfc3339()),
                ":ended_at": meeting.ended_at.map(|d| d.to_rfc3339()),
                ":summary": meeting.summary,
                ":transcript": serde_json::to_string(&meeting.transcript)?,
                ":extraction_status": meeting.extraction_status,
                ":created_at": meeting.created_at.to_rfc3339(),
                ":updated_at": meeting.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Meeting> {
        let sql = format!("{MEETING_SELECT} WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_meeting)?)
    }

    pub fn update_extraction_status(conn: &Connection, id: &str, status: &str) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE meetings SET extraction_status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, status, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "meeting {id} not found"
            )));
        }
        Ok(())
    }
}

pub struct ActionItemCandidateRepository;

impl ActionItemCandidateRepository {
    pub fn insert(conn: &Connection, candidate: &ActionItemCandidate) -> AppResult<()> {
        conn.execute(
            "INSERT INTO action_item_candidates (id, meeting_id, title, assignee_name, due, \
                effort_minutes, confidence, rationale, status, linked_task_id, created_at, updated_at) \
             VALUES (:id, :meeting_id, :title, :assignee_name, :due, \
                :effort_minutes, :confidence, :rationale, :status, :linked_task_id, :created_at, :updated_at)",
            named_params! {
                ":id": candidate.id,
                ":meeting_id": candidate.meeting_id,
                ":title": candidate.title,
                ":assignee_name": candidate.assignee_name,
                ":due": candidate.due.map(|d| d.to_rfc3339()),
                ":effort_minutes": candidate.effort_minutes,
                ":confidence": candidate.confidence,
                ":rationale": candidate.rationale,
                ":status": candidate.status,
                ":linked_task_id": candidate.linked_task_id,
                ":created_at": candidate.created_at.to_rfc3339(),
                ":updated_at": candidate.updated_at.to_rfc3339(),
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<ActionItemCandidate> {
        let sql = format!("{CANDIDATE_SELECT} WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_candidate)?)
    }

    pub fn list_by_meeting(conn: &Connection, meeting_id: &str) -> AppResult<Vec<ActionItemCandidate>> {
        let sql = format!("{CANDIDATE_SELECT} WHERE meeting_id = ?1 ORDER BY created_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([meeting_id], row_to_candidate)?;
        collect(rows)
    }

    pub fn update_status_and_link(
        conn: &Connection,
        id: &str,
        status: &str,
        linked_task_id: Option<&str>,
    ) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE action_item_candidates SET status = ?2, linked_task_id = ?3, updated_at = ?4 \
             WHERE id = ?1",
            rusqlite::params![id, status, linked_task_id, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(crate::error::AppError::not_found(format!(
                "action item candidate {id} not found"
            )));
        }
        Ok(())
    }
}

fn row_to_meeting(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let started_at: Option<String> = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let transcript_json: String = row.get("transcript")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let transcript: Vec<TranscriptUtterance> =
        serde_json::from_str(&transcript_json).unwrap_or_default();
    Ok(Meeting {
        id: row.get("id")?,
        title: row.get("title")?,
        started_at: started_at.map(|d| parse_rfc3339(&d)),
        ended_at: ended_at.map(|d| parse_rfc3339(&d)),
        summary: row.get("summary")?,
        transcript,
        extraction_status: row.get("extraction_status")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn row_to_candidate(row: &Row<'_>) -> rusqlite::Result<ActionItemCandidate> {
    let due: Option<String> = row.get("due")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(ActionItemCandidate {
        id: row.get("id")?,
        meeting_id: row.get("meeting_id")?,
        title: row.get("title")?,
        assignee_name: row.get("assignee_name")?,
        due: due.map(|d| parse_rfc3339(&d)),
        effort_minutes: row.get("effort_minutes")?,
        confidence: row.get("confidence")?,
        rationale: row.get("rationale")?,
        status: row.get("status")?,
        linked_task_id: row.get("linked_task_id")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn collect<I>(rows: I) -> AppResult<Vec<ActionItemCandidate>>
where
    I: Iterator<Item = rusqlite::Result<ActionItemCandidate>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

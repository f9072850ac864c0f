use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::task_repository::TaskRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::task::{self, Task, TaskCreateInput, TaskUpdateInput};

#[derive(Clone)]
pub struct TaskService {
    db: DbPool,
}

impl TaskService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_task(&self, input: TaskCreateInput) -> AppResult<Task> {
        let title = normalize_title(&input.title)?;
        let priority = normalize_priority(input.priority)?;
        let effort_minutes = normalize_effort(input.effort_minutes)?;
        let source = input
            .source
            .filter(|s| task::SOURCES.contains(&s.as_str()))
            .unwrap_or_else(|| "manual".to_string());

        let now = Utc::now();
        let record = Task {
            id: Uuid::new_v4().to_string(),
            title,
            description: normalize_optional_string(input.description),
            status: "todo".to_string(),
            priority,
            due: input.due,
            effort_minutes,
            project_id: input.project_id,
            source,
            source_ref: input.source_ref,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.db.with_connection(|conn| TaskRepository::insert(conn, &record))?;
        info!(task_id = %record.id, "task created");
        Ok(record)
    }

    pub fn update_task(&self, id: &str, update: TaskUpdateInput) -> AppResult<Task> {
        let mut existing = self.get_task(id)?;

        if let Some(expected) = update.expected_version {
            if expected != existing.version {
                return Err(AppError::conflict(format!(
                    "task {id} version mismatch: expected {expected}, found {}",
                    existing.version
                )));
            }
        }

        if let Some(title) = update.title {
            existing.title = normalize_title(&title)?;
        }
        if let Some(description) = update.description {
            existing.description = description.and_then(|d| normalize_optional_string(Some(d)));
        }
        if let Some(status) = update.status {
            if !task::STATUSES.contains(&status.as_str()) {
                return Err(AppError::validation(format!("unknown status '{status}'")));
            }
            existing.status = status;
        }
        if let Some(priority) = update.priority {
            existing.priority = normalize_priority(Some(priority))?;
        }
        if let Some(due) = update.due {
            existing.due = due;
        }
        if let Some(effort_minutes) = update.effort_minutes {
            existing.effort_minutes = normalize_effort(Some(effort_minutes))?;
        }
        if let Some(project_id) = update.project_id {
            existing.project_id = project_id;
        }

        existing.version += 1;
        existing.updated_at = Utc::now();

        self.db.with_connection(|conn| TaskRepository::update(conn, &existing))?;
        info!(task_id = %existing.id, "task updated");
        Ok(existing)
    }

    pub fn delete_task(&self, id: &str) -> AppResult<()> {
        self.db.with_connection(|conn| TaskRepository::delete(conn, id))?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> AppResult<Task> {
        let task = self.db.with_connection(|conn| TaskRepository::find_by_id(conn, id))?;
        debug!(task_id = %task.id, "task fetched");
        Ok(task)
    }

    pub fn list_tasks(&self) -> AppResult<Vec<Task>> {
        let tasks = self.db.with_connection(|conn| TaskRepository::list_all(conn))?;
        debug!(count = tasks.len(), "tasks listed");
        Ok(tasks)
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

fn normalize_title(title: &str) -> AppResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("title cannot be empty"));
    }
    if trimmed.chars().count() > 200 {
        return Err(AppError::validation("title must be under 200 characters"));
    }
    Ok(trimmed.to_string())
}

fn normalize_priority(priority: Option<String>) -> AppResult<String> {
    let value = priority.unwrap_or_else(|| "medium".to_string());
    if task::PRIORITIES.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(AppError::validation(format!("unknown priority '{value}'")))
    }
}

fn normalize_effort(value: Option<i64>) -> AppResult<i64> {
    let minutes = value.unwrap_or(60);
    if minutes < task::MIN_EFFORT_MINUTES || minutes > task::MAX_EFFORT_MINUTES {
        return Err(AppError::validation_with_details(
            "effort_minutes out of range",
            serde_json::json!({"effort_minutes": minutes, "min": task::MIN_EFFORT_MINUTES, "max": task::MAX_EFFORT_MINUTES}),
        ));
    }
    Ok(minutes)
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value.and_then(|val| {
        let trimmed = val.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_service() -> (TaskService, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let pool = DbPool::new(dir.path().join("tasks.sqlite")).expect("db pool");
        (TaskService::new(pool), dir)
    }

    #[test]
    fn create_and_fetch_task() {
        let (service, _dir) = setup_service();
        let record = service
            .create_task(TaskCreateInput {
                title: "Write report".into(),
                ..Default::default()
            })
            .expect("create task");

        assert!(!record.id.is_empty());
        assert_eq!(record.status, "todo");
        assert_eq!(record.priority, "medium");
        assert_eq!(record.effort_minutes, 60);

        let fetched = service.get_task(&record.id).expect("get task");
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.title, "Write report");
    }

    #[test]
    fn update_task_bumps_version_and_fields() {
        let (service, _dir) = setup_service();
        let record = service
            .create_task(TaskCreateInput {
                title: "Original title".into(),
                ..Default::default()
            })
            .expect("create task");

        let updated = service
            .update_task(
                &record.id,
                TaskUpdateInput {
                    title: Some("Updated title".into()),
                    status: Some("in_progress".into()),
                    priority: Some("high".into()),
                    ..Default::default()
                },
            )
            .expect("update task");

        assert_eq!(updated.title, "Updated title");
        assert_eq!(updated.status, "in_progress");
        assert_eq!(updated.priority, "high");
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn update_task_rejects_stale_version() {
        let (service, _dir) = setup_service();
        let record = service
            .create_task(TaskCreateInput {
                title: "Versioned".into(),
                ..Default::default()
            })
            .expect("create task");

        let result = service.update_task(
            &record.id,
            TaskUpdateInput {
                title: Some("Changed".into()),
                expected_version: Some(99),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(AppError::Conflict { .. })));
    }

    #[test]
    fn create_task_validates_priority() {
        let (service, _dir) = setup_service();
        let result = service.create_task(TaskCreateInput {
            title: "Task".into(),
            priority: Some("urgent".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[test]
    fn delete_task_removes_record() {
        let (service, _dir) = setup_service();
        let record = service
            .create_task(TaskCreateInput {
                title: "Delete me".into(),
                ..Default::default()
            })
            .expect("create task");

        service.delete_task(&record.id).expect("delete task");
        let result = service.get_task(&record.id);
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }
}

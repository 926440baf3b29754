//! SQLite implementation of the TaskRepository.
//!
//! Claim and finalize are conditional updates; the coordinator treats zero
//! affected rows as a lost race or terminal rejection respectively. Priority
//! selection uses an explicit CASE mapping rather than string ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::domain::ports::{FinalizeOutcome, TaskRepository};

/// `ORDER BY` clause ranking `critical` first, ties broken oldest-first.
const PRIORITY_ORDER: &str = r#"CASE priority
        WHEN 'critical' THEN 1
        WHEN 'high' THEN 2
        WHEN 'normal' THEN 3
        WHEN 'low' THEN 4
    END, created_at"#;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &Task) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (id, agent_id, persona_id, description, priority, status,
               result, created_at, claimed_at, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.agent_id.map(|id| id.to_string()))
        .bind(&task.persona_id)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.result)
        .bind(task.created_at.to_rfc3339())
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE status = ? ORDER BY created_at")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE agent_id = ? ORDER BY created_at")
                .bind(agent_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_agent_and_status(
        &self,
        agent_id: Uuid,
        status: TaskStatus,
    ) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE agent_id = ? AND status = ? ORDER BY created_at",
        )
        .bind(agent_id.to_string())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_in_progress_for_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks WHERE agent_id = ? AND status = 'in_progress'
               ORDER BY claimed_at LIMIT 1"#,
        )
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_pending_for_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>> {
        let sql = format!(
            "SELECT * FROM tasks WHERE agent_id = ? AND status = 'pending' ORDER BY {PRIORITY_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(agent_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_pending_for_persona(&self, persona_id: &str) -> DomainResult<Option<Task>> {
        let sql = format!(
            "SELECT * FROM tasks WHERE agent_id IS NULL AND persona_id = ? AND status = 'pending' ORDER BY {PRIORITY_ORDER} LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(persona_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn claim(&self, task_id: Uuid, agent_id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let now = now.to_rfc3339();
        let result = sqlx::query(
            r#"UPDATE tasks
               SET status = 'in_progress', agent_id = ?, claimed_at = ?, started_at = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(agent_id.to_string())
        .bind(&now)
        .bind(&now)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn finalize(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<FinalizeOutcome> {
        if !status.is_terminal() {
            return Err(DomainError::InvalidArgument(format!(
                "{} is not a terminal task status",
                status.as_str()
            )));
        }

        let updated = sqlx::query(
            r#"UPDATE tasks SET status = ?, result = ?, completed_at = ?
               WHERE id = ? AND status IN ('pending', 'in_progress')"#,
        )
        .bind(status.as_str())
        .bind(result)
        .bind(now.to_rfc3339())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(FinalizeOutcome::Applied);
        }

        match self.get(task_id).await? {
            Some(_) => Ok(FinalizeOutcome::AlreadyTerminal),
            None => Ok(FinalizeOutcome::NotFound),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    agent_id: Option<String>,
    persona_id: String,
    description: String,
    priority: String,
    status: String,
    result: Option<String>,
    created_at: String,
    claimed_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid task status: {}", row.status)))?;
        let priority = TaskPriority::from_str(&row.priority)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid priority: {}", row.priority)))?;

        Ok(Task {
            id: super::parse_uuid(&row.id)?,
            agent_id: super::parse_optional_uuid(row.agent_id)?,
            persona_id: row.persona_id,
            description: row.description,
            priority,
            status,
            result: row.result,
            created_at: super::parse_datetime(&row.created_at)?,
            claimed_at: super::parse_optional_datetime(row.claimed_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
        })
    }
}

//! SQLite implementation of the EventLogRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EventLogEntry, EventSeverity};
use crate::domain::ports::EventLogRepository;

#[derive(Clone)]
pub struct SqliteEventLogRepository {
    pool: SqlitePool,
}

impl SqliteEventLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for SqliteEventLogRepository {
    async fn append(&self, entry: &EventLogEntry) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO event_logs (id, event_type, timestamp, actor, correlation_id,
               entity_id, entity_type, severity, tags, payload)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.event_type)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.actor)
        .bind(entry.correlation_id.map(|id| id.to_string()))
        .bind(&entry.entity_id)
        .bind(&entry.entity_type)
        .bind(entry.severity.as_str())
        .bind(&entry.tags)
        .bind(&entry.payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<EventLogEntry>> {
        let rows: Vec<EventLogRow> =
            sqlx::query_as("SELECT * FROM event_logs ORDER BY rowid LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_type(&self, event_type: &str, limit: usize) -> DomainResult<Vec<EventLogEntry>> {
        let rows: Vec<EventLogRow> =
            sqlx::query_as("SELECT * FROM event_logs WHERE event_type = ? ORDER BY rowid LIMIT ?")
                .bind(event_type)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventLogRow {
    id: String,
    event_type: String,
    timestamp: String,
    actor: Option<String>,
    correlation_id: Option<String>,
    entity_id: Option<String>,
    entity_type: Option<String>,
    severity: String,
    tags: Option<String>,
    payload: String,
}

impl TryFrom<EventLogRow> for EventLogEntry {
    type Error = DomainError;

    fn try_from(row: EventLogRow) -> Result<Self, Self::Error> {
        let severity = EventSeverity::from_str(&row.severity)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid severity: {}", row.severity)))?;

        Ok(EventLogEntry {
            id: super::parse_uuid(&row.id)?,
            event_type: row.event_type,
            timestamp: super::parse_datetime(&row.timestamp)?,
            actor: row.actor,
            correlation_id: super::parse_optional_uuid(row.correlation_id)?,
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            severity,
            tags: row.tags,
            payload: row.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Utc;

    #[tokio::test]
    async fn append_and_list_preserve_insertion_order() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteEventLogRepository::new(pool);

        for name in ["task.created", "task.claimed", "task.completed"] {
            let entry = EventLogEntry::new(name, Utc::now(), EventSeverity::Info, "{}");
            repo.append(&entry).await.unwrap();
        }

        let rows = repo.list_recent(10).await.unwrap();
        let types: Vec<_> = rows.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(types, ["task.created", "task.claimed", "task.completed"]);

        let claimed = repo.list_by_type("task.claimed", 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }
}

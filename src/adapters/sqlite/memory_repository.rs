//! SQLite implementation of the MemoryRepository.
//!
//! Upsert and tracked reads run inside a transaction so the diff decision
//! and the access-stat bump are atomic with the read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MemoryEntry;
use crate::domain::ports::{MemoryRepository, UpsertOutcome};

#[derive(Clone)]
pub struct SqliteMemoryRepository {
    pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        namespace: &str,
        key: &str,
    ) -> DomainResult<Option<MemoryEntry>> {
        let row: Option<MemoryRow> =
            sqlx::query_as("SELECT * FROM memory_entries WHERE namespace = ? AND key = ?")
                .bind(namespace)
                .bind(key)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn upsert(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        entry_type: &str,
        metadata: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = Self::fetch_in_tx(&mut tx, namespace, key).await?;

        let outcome = match existing {
            None => {
                let entry = MemoryEntry::new(
                    namespace,
                    key,
                    value,
                    entry_type,
                    metadata.map(str::to_string),
                    now,
                );
                sqlx::query(
                    r#"INSERT INTO memory_entries (id, namespace, key, value, entry_type, metadata,
                       size, is_compressed, created_at, last_updated_at, accessed_at, access_count)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(entry.id.to_string())
                .bind(&entry.namespace)
                .bind(&entry.key)
                .bind(&entry.value)
                .bind(&entry.entry_type)
                .bind(&entry.metadata)
                .bind(entry.size as i64)
                .bind(i32::from(entry.is_compressed))
                .bind(entry.created_at.to_rfc3339())
                .bind(entry.last_updated_at.to_rfc3339())
                .bind(entry.accessed_at.map(|t| t.to_rfc3339()))
                .bind(entry.access_count as i64)
                .execute(&mut *tx)
                .await?;

                UpsertOutcome::Inserted(entry)
            }
            Some(entry) if entry.value == value && entry.metadata.as_deref() == metadata => {
                // Byte-identical save; leave the row untouched.
                UpsertOutcome::Unchanged(entry)
            }
            Some(mut entry) => {
                entry.apply_update(value, entry_type, metadata.map(str::to_string), now);
                sqlx::query(
                    r#"UPDATE memory_entries SET value = ?, entry_type = ?, metadata = ?,
                       size = ?, is_compressed = ?, last_updated_at = ?
                       WHERE namespace = ? AND key = ?"#,
                )
                .bind(&entry.value)
                .bind(&entry.entry_type)
                .bind(&entry.metadata)
                .bind(entry.size as i64)
                .bind(i32::from(entry.is_compressed))
                .bind(entry.last_updated_at.to_rfc3339())
                .bind(namespace)
                .bind(key)
                .execute(&mut *tx)
                .await?;

                UpsertOutcome::Updated(entry)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get(&self, namespace: &str, key: &str) -> DomainResult<Option<MemoryEntry>> {
        let row: Option<MemoryRow> =
            sqlx::query_as("SELECT * FROM memory_entries WHERE namespace = ? AND key = ?")
                .bind(namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn read_tracked(
        &self,
        namespace: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<MemoryEntry>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut entry) = Self::fetch_in_tx(&mut tx, namespace, key).await? else {
            return Ok(None);
        };

        entry.access_count += 1;
        entry.accessed_at = Some(now);

        sqlx::query(
            r#"UPDATE memory_entries SET accessed_at = ?, access_count = access_count + 1
               WHERE namespace = ? AND key = ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(namespace)
        .bind(key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(entry))
    }

    async fn list_namespace(&self, namespace: &str) -> DomainResult<Vec<MemoryEntry>> {
        let rows: Vec<MemoryRow> =
            sqlx::query_as("SELECT * FROM memory_entries WHERE namespace = ? ORDER BY created_at")
                .bind(namespace)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete(&self, namespace: &str, key: &str) -> DomainResult<Option<MemoryEntry>> {
        let mut tx = self.pool.begin().await?;

        let Some(entry) = Self::fetch_in_tx(&mut tx, namespace, key).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM memory_entries WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(entry))
    }
}

#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: String,
    namespace: String,
    key: String,
    value: String,
    entry_type: String,
    metadata: Option<String>,
    size: i64,
    is_compressed: i64,
    created_at: String,
    last_updated_at: String,
    accessed_at: Option<String>,
    access_count: i64,
}

impl TryFrom<MemoryRow> for MemoryEntry {
    type Error = DomainError;

    fn try_from(row: MemoryRow) -> Result<Self, Self::Error> {
        Ok(MemoryEntry {
            id: super::parse_uuid(&row.id)?,
            namespace: row.namespace,
            key: row.key,
            value: row.value,
            entry_type: row.entry_type,
            metadata: row.metadata,
            size: row.size as u64,
            is_compressed: row.is_compressed != 0,
            created_at: super::parse_datetime(&row.created_at)?,
            last_updated_at: super::parse_datetime(&row.last_updated_at)?,
            accessed_at: super::parse_optional_datetime(row.accessed_at)?,
            access_count: row.access_count as u64,
        })
    }
}

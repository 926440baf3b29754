//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus};
use crate::domain::ports::{AgentRepository, TransitionOutcome};

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn insert(&self, agent: &Agent) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO agents (id, persona_id, working_directory, model, worktree_name,
               process_id, status, registered_at, started_at, last_heartbeat, stopped_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.to_string())
        .bind(&agent.persona_id)
        .bind(&agent.working_directory)
        .bind(&agent.model)
        .bind(&agent.worktree_name)
        .bind(agent.process_id.map(i64::from))
        .bind(agent.status.as_str())
        .bind(agent.registered_at.to_rfc3339())
        .bind(agent.started_at.map(|t| t.to_rfc3339()))
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.stopped_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, persona_filter: Option<&str>) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = if let Some(persona) = persona_filter {
            sqlx::query_as("SELECT * FROM agents WHERE persona_id = ? ORDER BY registered_at")
                .bind(persona)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM agents ORDER BY registered_at")
                .fetch_all(&self.pool)
                .await?
        };

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn touch_heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE agents SET last_heartbeat = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_running(
        &self,
        id: Uuid,
        process_id: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome> {
        let result = sqlx::query(
            r#"UPDATE agents SET status = 'running', process_id = ?, started_at = ?
               WHERE id = ? AND status = 'starting'"#,
        )
        .bind(i64::from(process_id))
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            TransitionOutcome::Applied
        } else {
            TransitionOutcome::NotApplied
        })
    }

    async fn transition_terminal(
        &self,
        id: Uuid,
        status: AgentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome> {
        if !status.is_terminal() {
            return Err(DomainError::InvalidArgument(format!(
                "{} is not a terminal agent status",
                status.as_str()
            )));
        }

        let result = sqlx::query(
            r#"UPDATE agents SET status = ?, stopped_at = ?
               WHERE id = ? AND status NOT IN ('stopped', 'killed')"#,
        )
        .bind(status.as_str())
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            TransitionOutcome::Applied
        } else {
            TransitionOutcome::NotApplied
        })
    }

    async fn list_running_stale(&self, cutoff: DateTime<Utc>) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            r#"SELECT * FROM agents WHERE status = 'running' AND last_heartbeat < ?
               ORDER BY last_heartbeat"#,
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    persona_id: String,
    working_directory: String,
    model: Option<String>,
    worktree_name: Option<String>,
    process_id: Option<i64>,
    status: String,
    registered_at: String,
    started_at: Option<String>,
    last_heartbeat: String,
    stopped_at: Option<String>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let status = AgentStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid agent status: {}", row.status)))?;

        Ok(Agent {
            id: super::parse_uuid(&row.id)?,
            persona_id: row.persona_id,
            working_directory: row.working_directory,
            model: row.model,
            worktree_name: row.worktree_name,
            process_id: row.process_id.map(|p| p as u32),
            status,
            registered_at: super::parse_datetime(&row.registered_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            last_heartbeat: super::parse_datetime(&row.last_heartbeat)?,
            stopped_at: super::parse_optional_datetime(row.stopped_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::RegisterAgentRequest;

    async fn setup() -> SqliteAgentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    fn new_agent() -> Agent {
        Agent::register(
            RegisterAgentRequest {
                persona_id: "implementer".to_string(),
                working_directory: "/tmp/work".to_string(),
                model: None,
                worktree_name: None,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let repo = setup().await;
        let agent = new_agent();

        repo.insert(&agent).await.unwrap();

        let fetched = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.persona_id, "implementer");
        assert_eq!(fetched.status, AgentStatus::Starting);
        assert!(fetched.process_id.is_none());
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_agent_returns_false() {
        let repo = setup().await;
        let touched = repo.touch_heartbeat(Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(!touched);
    }

    #[tokio::test]
    async fn mark_running_only_applies_from_starting() {
        let repo = setup().await;
        let agent = new_agent();
        repo.insert(&agent).await.unwrap();

        let first = repo.mark_running(agent.id, 1234, Utc::now()).await.unwrap();
        assert_eq!(first, TransitionOutcome::Applied);

        let second = repo.mark_running(agent.id, 1234, Utc::now()).await.unwrap();
        assert_eq!(second, TransitionOutcome::NotApplied);

        let fetched = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, AgentStatus::Running);
        assert_eq!(fetched.process_id, Some(1234));
        assert!(fetched.started_at.is_some());
    }

    #[tokio::test]
    async fn terminal_transition_is_one_way() {
        let repo = setup().await;
        let agent = new_agent();
        repo.insert(&agent).await.unwrap();

        let killed = repo
            .transition_terminal(agent.id, AgentStatus::Killed, Utc::now())
            .await
            .unwrap();
        assert_eq!(killed, TransitionOutcome::Applied);

        let again = repo
            .transition_terminal(agent.id, AgentStatus::Stopped, Utc::now())
            .await
            .unwrap();
        assert_eq!(again, TransitionOutcome::NotApplied);

        let fetched = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, AgentStatus::Killed);
        assert!(fetched.stopped_at.is_some());
    }

    #[tokio::test]
    async fn stale_sweep_only_sees_running_agents() {
        let repo = setup().await;
        let now = Utc::now();

        let starting = new_agent();
        repo.insert(&starting).await.unwrap();

        let running = new_agent();
        repo.insert(&running).await.unwrap();
        repo.mark_running(running.id, 42, now).await.unwrap();

        // Heartbeats are at registration time; a cutoff in the future makes
        // the running agent stale.
        let cutoff = now + chrono::Duration::minutes(10);
        let stale = repo.list_running_stale(cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, running.id);
    }
}

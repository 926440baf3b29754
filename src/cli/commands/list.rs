//! `aiswarm list`: show registered agents.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::adapters::sqlite::{initialize_database, SqliteAgentRepository};
use crate::domain::ports::AgentRepository;
use crate::services::Config;

pub async fn handle_list(
    base_dir: &Path,
    config: Config,
    persona: Option<String>,
    json: bool,
) -> Result<()> {
    let pool = initialize_database(&config.database_url(base_dir))
        .await
        .context("Failed to open coordination database")?;
    let repository = Arc::new(SqliteAgentRepository::new(pool));

    let agents = repository.list(persona.as_deref()).await?;

    if json {
        let rows: Vec<serde_json::Value> = agents
            .iter()
            .map(|a| {
                serde_json::json!({
                    "agentId": a.id.to_string(),
                    "persona": a.persona_id,
                    "status": a.status.as_str(),
                    "processId": a.process_id,
                    "lastHeartbeat": a.last_heartbeat.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Agent", "Persona", "Status", "PID", "Last heartbeat"]);
    for agent in &agents {
        table.add_row([
            agent.id.to_string(),
            agent.persona_id.clone(),
            agent.status.as_str().to_string(),
            agent.process_id.map_or_else(|| "-".to_string(), |p| p.to_string()),
            agent.last_heartbeat.to_rfc3339(),
        ]);
    }
    println!("{table}");

    Ok(())
}

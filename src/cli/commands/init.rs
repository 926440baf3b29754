//! `aiswarm init`: prepare a working directory for the swarm.

use std::path::Path;

use anyhow::{Context, Result};

use crate::adapters::sqlite::initialize_database;
use crate::services::Config;

const DEFAULT_CONFIG: &str = r#"# aiswarm coordination server configuration.
# Every key is optional; these are the defaults.

[database]
path = ".aiswarm/coordination.db"

[monitor]
heartbeat_timeout_secs = 300
check_interval_secs = 60

[dispatch]
default_wait_millis = 30000

[logging]
level = "info"
format = "pretty"

[launcher]
program = "claude"
args = []
"#;

pub async fn handle_init(base_dir: &Path, force: bool) -> Result<()> {
    let swarm_dir = base_dir.join(".aiswarm");
    std::fs::create_dir_all(swarm_dir.join("personas")).context("Failed to create .aiswarm directory")?;

    let config_path = swarm_dir.join("config.toml");
    if config_path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", config_path.display());
    } else {
        std::fs::write(&config_path, DEFAULT_CONFIG).context("Failed to write config file")?;
        println!("Wrote {}", config_path.display());
    }

    let config = Config::load(base_dir)?;
    initialize_database(&config.database_url(base_dir))
        .await
        .context("Failed to initialize database")?;
    println!("Initialized database at {}", base_dir.join(&config.database.path).display());

    Ok(())
}

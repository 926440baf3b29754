//! Command-line interface for the aiswarm coordination server.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aiswarm", version, about = "Coordination server for AI agent swarms")]
pub struct Cli {
    /// Working directory for the swarm (defaults to the current directory).
    #[arg(long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .aiswarm directory, default config, and database.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Run the MCP coordination server on stdin/stdout.
    Serve,

    /// Launch one agent process and register it.
    Launch {
        /// Persona tag for the agent (e.g. implementer, reviewer, planner).
        #[arg(long)]
        agent: String,

        /// What the agent should work on.
        #[arg(long, default_value = "Pull tasks from the coordinator and execute them.")]
        description: String,

        /// Model override for the agent process.
        #[arg(long)]
        model: Option<String>,

        /// Git worktree name the agent should operate in.
        #[arg(long)]
        worktree: Option<String>,

        /// Show what would be launched without spawning anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip permission prompts in the spawned agent.
        #[arg(long)]
        yolo: bool,
    },

    /// List registered agents.
    List {
        /// Only show agents with this persona tag.
        #[arg(long)]
        persona: Option<String>,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Run the heartbeat monitor sweep loop in the foreground.
    Monitor,
}

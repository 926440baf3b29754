//! Agent process launcher port.
//!
//! The launcher is an external collaborator: it spawns the agent child
//! process and prepares its working context. The core only consumes this
//! interface from the `launch_agent` tool and the `launch` CLI command.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Parameters for spawning one agent process.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Server-assigned id the child must use when calling back in.
    pub agent_id: Uuid,
    pub persona_id: String,
    pub description: String,
    pub working_directory: String,
    pub model: Option<String>,
    pub worktree_name: Option<String>,
    /// Skip permission prompts in the spawned agent.
    pub yolo: bool,
}

/// Result of a successful spawn.
#[derive(Debug, Clone)]
pub struct LaunchedProcess {
    pub process_id: u32,
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> DomainResult<LaunchedProcess>;
}

//! OS process adapters: the SIGKILL terminator and the agent launcher.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{LaunchRequest, LaunchedProcess, Launcher, PersonaLoader, ProcessTerminator};

/// Best-effort SIGKILL. A delivery failure (dead pid, permissions) is
/// reported as `false` and never raised.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalTerminator;

#[async_trait]
impl ProcessTerminator for SignalTerminator {
    async fn kill(&self, process_id: u32) -> bool {
        // A pid that does not fit pid_t would wrap negative and address a
        // process group; treat it as undeliverable instead.
        let Ok(pid) = i32::try_from(process_id) else {
            return false;
        };
        kill(Pid::from_raw(pid), Signal::SIGKILL).is_ok()
    }
}

/// Spawns agent child processes. Writes the persona prompt to a per-agent
/// context file and hands the agent its identity through the environment.
pub struct ProcessLauncher {
    program: String,
    base_args: Vec<String>,
    personas: Arc<dyn PersonaLoader>,
}

impl ProcessLauncher {
    pub fn new(program: String, base_args: Vec<String>, personas: Arc<dyn PersonaLoader>) -> Self {
        Self { program, base_args, personas }
    }

    fn write_context(&self, request: &LaunchRequest) -> DomainResult<std::path::PathBuf> {
        let prompt = self.personas.load(&request.persona_id)?;
        let agent_dir = Path::new(&request.working_directory)
            .join(".aiswarm")
            .join("agents")
            .join(request.agent_id.to_string());
        std::fs::create_dir_all(&agent_dir)
            .map_err(|e| DomainError::LaunchFailed(format!("cannot create agent dir: {e}")))?;

        let context_path = agent_dir.join("context.md");
        let content = format!("{prompt}\n\n## Assignment\n\n{}\n", request.description);
        std::fs::write(&context_path, content)
            .map_err(|e| DomainError::LaunchFailed(format!("cannot write context file: {e}")))?;
        Ok(context_path)
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, request: &LaunchRequest) -> DomainResult<LaunchedProcess> {
        let context_path = self.write_context(request)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .env("AISWARM_AGENT_ID", request.agent_id.to_string())
            .env("AISWARM_PERSONA", &request.persona_id)
            .env("AISWARM_CONTEXT_FILE", &context_path)
            .current_dir(&request.working_directory)
            .stdin(std::process::Stdio::null());

        if let Some(model) = &request.model {
            command.arg("--model").arg(model);
        }
        if request.yolo {
            command.arg("--dangerously-skip-permissions");
        }

        let mut child = command
            .spawn()
            .map_err(|e| DomainError::LaunchFailed(format!("{}: {e}", self.program)))?;

        let process_id = child
            .id()
            .ok_or_else(|| DomainError::LaunchFailed("child exited before pid was read".into()))?;

        // Reap the child in the background so it never zombifies.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(LaunchedProcess { process_id })
    }
}

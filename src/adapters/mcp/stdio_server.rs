//! MCP stdio server implementing JSON-RPC 2.0 over stdin/stdout.
//!
//! Exposes the coordination operations as native agent tools via the MCP
//! (Model Context Protocol). Each `tools/call` runs in its own task so a
//! long-poll (`get_next_task`, `wait_for_memory_key`) never blocks other
//! callers; responses are serialized through a single writer task.
//!
//! Protocol: newline-delimited JSON-RPC 2.0 on stdin/stdout.
//! Logging goes to stderr (stdout is reserved for protocol messages).
//!
//! Tool handlers are pure translation: parse arguments, call the service,
//! map the domain result to a `{"success": …}` envelope. Domain failures
//! never cross the RPC boundary as exceptions.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Agent, MemoryEntry, RegisterAgentRequest, Task, TaskPriority, TaskStatus};
use crate::domain::ports::{LaunchRequest, Launcher};
use crate::services::{
    AgentRegistry, GetNextOutcome, MemoryStore, NewTaskRequest, TaskCoordinator, WaitMode,
    WaitOutcome,
};

/// MCP stdio server that exposes the coordination APIs as native tools.
pub struct StdioServer {
    registry: Arc<AgentRegistry>,
    coordinator: Arc<TaskCoordinator>,
    memory: Arc<MemoryStore>,
    launcher: Arc<dyn Launcher>,
    working_directory: String,
    default_wait: Duration,
    shutdown: CancellationToken,
}

impl StdioServer {
    pub fn new(
        registry: Arc<AgentRegistry>,
        coordinator: Arc<TaskCoordinator>,
        memory: Arc<MemoryStore>,
        launcher: Arc<dyn Launcher>,
        working_directory: String,
        default_wait: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            coordinator,
            memory,
            launcher,
            working_directory,
            default_wait,
            shutdown,
        }
    }

    /// Run the stdio server loop, reading JSON-RPC from stdin and writing
    /// responses to stdout until EOF or shutdown.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(response) = out_rx.recv().await {
                let mut bytes = response.into_bytes();
                bytes.push(b'\n');
                if stdout.write_all(&bytes).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        eprintln!("[aiswarm-mcp] stdio server started");

        loop {
            let line = tokio::select! {
                () = self.shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };

            let Ok(Some(line)) = line else { break };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let server = Arc::clone(&self);
            let out = out_tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_message(&line).await {
                    let _ = out.send(response);
                }
            });
        }

        drop(out_tx);
        let _ = writer.await;
        eprintln!("[aiswarm-mcp] stdio server stopped");
        Ok(())
    }

    /// Handle one JSON-RPC message. Returns `None` for notifications.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        let request: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Some(self.error_response(
                    serde_json::Value::Null,
                    -32700,
                    &format!("Parse error: {}", e),
                ));
            }
        };

        let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(serde_json::json!({}));

        match method {
            "initialize" => Some(self.handle_initialize(id)),
            "tools/list" => Some(self.handle_tools_list(id)),
            "tools/call" => Some(self.handle_tools_call(id, &params).await),
            "notifications/initialized" => None,
            _ => Some(self.error_response(id, -32601, &format!("Method not found: {}", method))),
        }
    }

    fn handle_initialize(&self, id: serde_json::Value) -> String {
        let result = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "aiswarm",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        self.success_response(id, result)
    }

    fn handle_tools_list(&self, id: serde_json::Value) -> String {
        let tools = serde_json::json!({
            "tools": [
                {
                    "name": "launch_agent",
                    "description": "Launch a new agent process with the given persona and register it with the coordinator. Returns the new agentId the process will use for get_next_task and heartbeats.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "persona": { "type": "string", "description": "Persona routing tag for the agent (e.g. 'implementer', 'reviewer', 'planner')" },
                            "description": { "type": "string", "description": "What this agent should work on. Written into the agent's context file." },
                            "model": { "type": "string", "description": "Optional model override for the agent process" },
                            "worktreeName": { "type": "string", "description": "Optional git worktree the agent should operate in" },
                            "yolo": { "type": "boolean", "description": "Skip permission prompts in the spawned agent" }
                        },
                        "required": ["persona", "description"]
                    }
                },
                {
                    "name": "kill_agent",
                    "description": "Forcefully terminate an agent: kills its OS process (best effort) and marks it Killed. Idempotent on already-terminated agents.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "agentId": { "type": "string", "description": "Agent UUID returned by launch_agent" }
                        },
                        "required": ["agentId"]
                    }
                },
                {
                    "name": "list_agents",
                    "description": "List registered agents with their persona, status, and heartbeat. Optionally filter by persona tag.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "personaFilter": { "type": "string", "description": "Only return agents with this persona tag" }
                        }
                    }
                },
                {
                    "name": "create_task",
                    "description": "Create a task for the swarm. Route by persona (any agent with that persona may claim it) or pin it to a specific agent with agentId. Higher priority tasks are dispatched first; ties go to the oldest task.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "agentId": { "type": "string", "description": "Pin the task to this agent (must be Starting or Running)" },
                            "persona": { "type": "string", "description": "Persona routing tag. Required even for pinned tasks." },
                            "description": { "type": "string", "description": "What needs to be done. This is the prompt the claiming agent sees." },
                            "priority": { "type": "string", "enum": ["low", "normal", "high", "critical"], "description": "Task priority. Default: normal." }
                        },
                        "required": ["persona", "description"]
                    }
                },
                {
                    "name": "get_next_task",
                    "description": "Long-poll for the caller's next task. Returns the agent's current in-progress task if it has one, otherwise claims the best eligible pending task, otherwise waits up to waitMillis for one to appear. On timeout returns a taskId starting with 'system:requery:' meaning poll again.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "agentId": { "type": "string", "description": "The calling agent's UUID" },
                            "waitMillis": { "type": "integer", "description": "Maximum milliseconds to wait for a task (default: 30000)" }
                        },
                        "required": ["agentId"]
                    }
                },
                {
                    "name": "report_task_completion",
                    "description": "Mark a task Completed with its result. Fails with AlreadyTerminal if the task was already completed or failed.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "taskId": { "type": "string", "description": "Task UUID" },
                            "result": { "type": "string", "description": "Outcome summary stored on the task" }
                        },
                        "required": ["taskId", "result"]
                    }
                },
                {
                    "name": "report_task_failure",
                    "description": "Mark a task Failed with an error message. Fails with AlreadyTerminal if the task was already completed or failed.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "taskId": { "type": "string", "description": "Task UUID" },
                            "errorMessage": { "type": "string", "description": "What went wrong" }
                        },
                        "required": ["taskId", "errorMessage"]
                    }
                },
                {
                    "name": "get_task_status",
                    "description": "Get one task's full state by UUID: status, priority, assigned agent, result, and timestamps.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "taskId": { "type": "string", "description": "Task UUID" }
                        },
                        "required": ["taskId"]
                    }
                },
                {
                    "name": "get_tasks_by_status",
                    "description": "List all tasks in one status (pending, in_progress, completed, failed), oldest first.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "failed"] }
                        },
                        "required": ["status"]
                    }
                },
                {
                    "name": "get_tasks_by_agent_id",
                    "description": "List all tasks assigned to an agent, oldest first.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "agentId": { "type": "string", "description": "Agent UUID" }
                        },
                        "required": ["agentId"]
                    }
                },
                {
                    "name": "get_tasks_by_agent_id_and_status",
                    "description": "List an agent's tasks filtered by status, oldest first.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "agentId": { "type": "string", "description": "Agent UUID" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "failed"] }
                        },
                        "required": ["agentId", "status"]
                    }
                },
                {
                    "name": "save_memory",
                    "description": "Upsert a shared memory entry by (namespace, key). Other agents can read it or block on it with wait_for_memory_key. Saving an identical value is a no-op.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string", "description": "Entry key, unique within its namespace" },
                            "value": { "type": "string", "description": "Entry value" },
                            "type": { "type": "string", "description": "Content type discriminator (default: json)" },
                            "metadata": { "type": "string", "description": "Optional metadata blob stored alongside the value" },
                            "namespace": { "type": "string", "description": "Namespace for isolation (default: empty)" }
                        },
                        "required": ["key", "value"]
                    }
                },
                {
                    "name": "read_memory",
                    "description": "Read a memory entry by key. Updates the entry's access statistics.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string", "description": "Entry key" },
                            "namespace": { "type": "string", "description": "Namespace (default: empty)" }
                        },
                        "required": ["key"]
                    }
                },
                {
                    "name": "list_memory",
                    "description": "List all memory entries in a namespace, oldest first.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "namespace": { "type": "string", "description": "Namespace to list" }
                        },
                        "required": ["namespace"]
                    }
                },
                {
                    "name": "wait_for_memory_key",
                    "description": "Block until a memory key is created (mode=creation; returns immediately if it already exists) or updated (mode=update; never fires on the current value), up to timeoutMillis.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string", "description": "Entry key to wait on" },
                            "namespace": { "type": "string", "description": "Namespace (default: empty)" },
                            "timeoutMillis": { "type": "integer", "description": "Maximum milliseconds to wait" },
                            "mode": { "type": "string", "enum": ["creation", "update"], "description": "Which event ends the wait" }
                        },
                        "required": ["key", "timeoutMillis", "mode"]
                    }
                }
            ]
        });
        self.success_response(id, tools)
    }

    async fn handle_tools_call(&self, id: serde_json::Value, params: &serde_json::Value) -> String {
        let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

        let envelope = match tool_name {
            "launch_agent" => self.tool_launch_agent(&arguments).await,
            "kill_agent" => self.tool_kill_agent(&arguments).await,
            "list_agents" => self.tool_list_agents(&arguments).await,
            "create_task" => self.tool_create_task(&arguments).await,
            "get_next_task" => self.tool_get_next_task(&arguments).await,
            "report_task_completion" => self.tool_report_task_completion(&arguments).await,
            "report_task_failure" => self.tool_report_task_failure(&arguments).await,
            "get_task_status" => self.tool_get_task_status(&arguments).await,
            "get_tasks_by_status" => self.tool_get_tasks_by_status(&arguments).await,
            "get_tasks_by_agent_id" => self.tool_get_tasks_by_agent_id(&arguments).await,
            "get_tasks_by_agent_id_and_status" => {
                self.tool_get_tasks_by_agent_id_and_status(&arguments).await
            }
            "save_memory" => self.tool_save_memory(&arguments).await,
            "read_memory" => self.tool_read_memory(&arguments).await,
            "list_memory" => self.tool_list_memory(&arguments).await,
            "wait_for_memory_key" => self.tool_wait_for_memory_key(&arguments).await,
            _ => {
                let result = serde_json::json!({
                    "content": [{
                        "type": "text",
                        "text": format!("Unknown tool: {}", tool_name)
                    }],
                    "isError": true
                });
                return self.success_response(id, result);
            }
        };

        let text = serde_json::to_string_pretty(&envelope)
            .unwrap_or_else(|_| r#"{"success":false,"errorMessage":"unserializable result"}"#.to_string());
        let result = serde_json::json!({
            "content": [{
                "type": "text",
                "text": text
            }]
        });
        self.success_response(id, result)
    }

    // ========================================================================
    // Agent tools
    // ========================================================================

    async fn tool_launch_agent(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(persona) = args.get("persona").and_then(|p| p.as_str()) else {
            return failure("Missing required field: persona");
        };
        let Some(description) = args.get("description").and_then(|d| d.as_str()) else {
            return failure("Missing required field: description");
        };
        let model = args.get("model").and_then(|m| m.as_str()).map(str::to_string);
        let worktree_name = args.get("worktreeName").and_then(|w| w.as_str()).map(str::to_string);
        let yolo = args.get("yolo").and_then(|y| y.as_bool()).unwrap_or(false);

        let agent_id = match self
            .registry
            .register(RegisterAgentRequest {
                persona_id: persona.to_string(),
                working_directory: self.working_directory.clone(),
                model: model.clone(),
                worktree_name: worktree_name.clone(),
            })
            .await
        {
            Ok(id) => id,
            Err(e) => return domain_failure(&e),
        };

        let request = LaunchRequest {
            agent_id,
            persona_id: persona.to_string(),
            description: description.to_string(),
            working_directory: self.working_directory.clone(),
            model,
            worktree_name,
            yolo,
        };

        match self.launcher.launch(&request).await {
            Ok(launched) => {
                if let Err(e) = self.registry.mark_running(agent_id, launched.process_id).await {
                    return domain_failure(&e);
                }
                serde_json::json!({
                    "success": true,
                    "agentId": agent_id.to_string(),
                    "processId": launched.process_id,
                })
            }
            Err(e) => {
                // The registration stays for audit; the agent never came up.
                if let Err(stop_err) = self.registry.stop(agent_id).await {
                    tracing::warn!(%agent_id, error = %stop_err, "failed to stop unlaunched agent");
                }
                domain_failure(&e)
            }
        }
    }

    async fn tool_kill_agent(&self, args: &serde_json::Value) -> serde_json::Value {
        let agent_id = match required_uuid(args, "agentId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        match self.registry.kill(agent_id, Some("requested via kill_agent".to_string())).await {
            Ok(()) => serde_json::json!({ "success": true, "agentId": agent_id.to_string() }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_list_agents(&self, args: &serde_json::Value) -> serde_json::Value {
        let persona_filter = args.get("personaFilter").and_then(|p| p.as_str());

        match self.registry.list(persona_filter).await {
            Ok(agents) => serde_json::json!({
                "success": true,
                "agents": agents.iter().map(agent_json).collect::<Vec<_>>(),
            }),
            Err(e) => domain_failure(&e),
        }
    }

    // ========================================================================
    // Task tools
    // ========================================================================

    async fn tool_create_task(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(persona) = args.get("persona").and_then(|p| p.as_str()) else {
            return failure("Missing required field: persona");
        };
        let Some(description) = args.get("description").and_then(|d| d.as_str()) else {
            return failure("Missing required field: description");
        };

        let agent_id = match optional_uuid(args, "agentId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        let priority = match args.get("priority").and_then(|p| p.as_str()) {
            None => TaskPriority::Normal,
            Some(raw) => match TaskPriority::from_str(raw) {
                Some(priority) => priority,
                None => return failure(&format!("Invalid priority: {}", raw)),
            },
        };

        let request = NewTaskRequest {
            agent_id,
            persona_id: persona.to_string(),
            description: description.to_string(),
            priority,
        };

        match self.coordinator.create(request).await {
            Ok(task_id) => serde_json::json!({ "success": true, "taskId": task_id.to_string() }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_get_next_task(&self, args: &serde_json::Value) -> serde_json::Value {
        let agent_id = match required_uuid(args, "agentId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        let wait = args
            .get("waitMillis")
            .and_then(|w| w.as_u64())
            .map_or(self.default_wait, Duration::from_millis);

        let call_token = self.shutdown.child_token();
        match self.coordinator.get_next(agent_id, wait, &call_token).await {
            Ok(GetNextOutcome::Task(task)) => serde_json::json!({
                "success": true,
                "taskId": task.task_id.to_string(),
                "description": task.description,
                "persona": task.persona_id,
            }),
            Ok(GetNextOutcome::TimedOut { requery_id }) => serde_json::json!({
                "success": true,
                "taskId": requery_id,
            }),
            Ok(GetNextOutcome::Cancelled) => failure("get_next_task was cancelled"),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_report_task_completion(&self, args: &serde_json::Value) -> serde_json::Value {
        let task_id = match required_uuid(args, "taskId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };
        let Some(result) = args.get("result").and_then(|r| r.as_str()) else {
            return failure("Missing required field: result");
        };

        match self.coordinator.report_completion(task_id, result).await {
            Ok(()) => serde_json::json!({ "success": true, "taskId": task_id.to_string() }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_report_task_failure(&self, args: &serde_json::Value) -> serde_json::Value {
        let task_id = match required_uuid(args, "taskId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };
        let Some(error_message) = args.get("errorMessage").and_then(|e| e.as_str()) else {
            return failure("Missing required field: errorMessage");
        };

        match self.coordinator.report_failure(task_id, error_message).await {
            Ok(()) => serde_json::json!({ "success": true, "taskId": task_id.to_string() }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_get_task_status(&self, args: &serde_json::Value) -> serde_json::Value {
        let task_id = match required_uuid(args, "taskId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        match self.coordinator.get_task(task_id).await {
            Ok(Some(task)) => serde_json::json!({ "success": true, "task": task_json(&task) }),
            Ok(None) => domain_failure(&DomainError::TaskNotFound(task_id)),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_get_tasks_by_status(&self, args: &serde_json::Value) -> serde_json::Value {
        let status = match required_status(args) {
            Ok(status) => status,
            Err(envelope) => return envelope,
        };

        match self.coordinator.tasks_by_status(status).await {
            Ok(tasks) => tasks_envelope(&tasks),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_get_tasks_by_agent_id(&self, args: &serde_json::Value) -> serde_json::Value {
        let agent_id = match required_uuid(args, "agentId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };

        match self.coordinator.tasks_by_agent(agent_id).await {
            Ok(tasks) => tasks_envelope(&tasks),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_get_tasks_by_agent_id_and_status(
        &self,
        args: &serde_json::Value,
    ) -> serde_json::Value {
        let agent_id = match required_uuid(args, "agentId") {
            Ok(id) => id,
            Err(envelope) => return envelope,
        };
        let status = match required_status(args) {
            Ok(status) => status,
            Err(envelope) => return envelope,
        };

        match self.coordinator.tasks_by_agent_and_status(agent_id, status).await {
            Ok(tasks) => tasks_envelope(&tasks),
            Err(e) => domain_failure(&e),
        }
    }

    // ========================================================================
    // Memory tools
    // ========================================================================

    async fn tool_save_memory(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(key) = args.get("key").and_then(|k| k.as_str()) else {
            return failure("Missing required field: key");
        };
        let Some(value) = args.get("value").and_then(|v| v.as_str()) else {
            return failure("Missing required field: value");
        };
        let entry_type = args.get("type").and_then(|t| t.as_str());
        let metadata = args.get("metadata").and_then(|m| m.as_str());
        let namespace = args.get("namespace").and_then(|n| n.as_str()).unwrap_or("");

        match self.memory.save(key, value, entry_type, metadata, namespace).await {
            Ok(entry) => serde_json::json!({
                "success": true,
                "key": entry.key,
                "namespace": entry.namespace,
                "size": entry.size,
            }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_read_memory(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(key) = args.get("key").and_then(|k| k.as_str()) else {
            return failure("Missing required field: key");
        };
        let namespace = args.get("namespace").and_then(|n| n.as_str()).unwrap_or("");

        match self.memory.read(key, namespace).await {
            Ok(entry) => serde_json::json!({ "success": true, "entry": entry_json(&entry) }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_list_memory(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(namespace) = args.get("namespace").and_then(|n| n.as_str()) else {
            return failure("Missing required field: namespace");
        };

        match self.memory.list(namespace).await {
            Ok(entries) => serde_json::json!({
                "success": true,
                "entries": entries.iter().map(entry_json).collect::<Vec<_>>(),
            }),
            Err(e) => domain_failure(&e),
        }
    }

    async fn tool_wait_for_memory_key(&self, args: &serde_json::Value) -> serde_json::Value {
        let Some(key) = args.get("key").and_then(|k| k.as_str()) else {
            return failure("Missing required field: key");
        };
        let Some(timeout_millis) = args.get("timeoutMillis").and_then(|t| t.as_u64()) else {
            return failure("Missing required field: timeoutMillis");
        };
        let mode = match args.get("mode").and_then(|m| m.as_str()).and_then(WaitMode::from_str) {
            Some(mode) => mode,
            None => return failure("Invalid mode: expected 'creation' or 'update'"),
        };
        let namespace = args.get("namespace").and_then(|n| n.as_str()).unwrap_or("");

        let wait = Duration::from_millis(timeout_millis);
        let call_token = self.shutdown.child_token();
        let outcome = match mode {
            WaitMode::Creation => {
                self.memory.wait_for_creation(key, namespace, wait, &call_token).await
            }
            WaitMode::Update => {
                self.memory.wait_for_update(key, namespace, wait, &call_token).await
            }
        };

        match outcome {
            Ok(WaitOutcome::Ready(entry)) => {
                serde_json::json!({ "success": true, "entry": entry_json(&entry) })
            }
            Ok(WaitOutcome::TimedOut) => {
                failure(&format!("Timed out waiting for memory key {}/{}", namespace, key))
            }
            Ok(WaitOutcome::Cancelled) => failure("wait_for_memory_key was cancelled"),
            Err(e) => domain_failure(&e),
        }
    }

    // ========================================================================
    // JSON-RPC helpers
    // ========================================================================

    fn success_response(&self, id: serde_json::Value, result: serde_json::Value) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        })
        .to_string()
    }

    fn error_response(&self, id: serde_json::Value, code: i32, message: &str) -> String {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": code,
                "message": message
            }
        })
        .to_string()
    }
}

fn failure(message: &str) -> serde_json::Value {
    serde_json::json!({ "success": false, "errorMessage": message })
}

fn domain_failure(error: &DomainError) -> serde_json::Value {
    failure(&error.to_string())
}

fn required_uuid(args: &serde_json::Value, field: &str) -> Result<Uuid, serde_json::Value> {
    let raw = args
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| failure(&format!("Missing required field: {}", field)))?;
    Uuid::parse_str(raw).map_err(|_| failure(&format!("Invalid UUID in {}: {}", field, raw)))
}

fn optional_uuid(args: &serde_json::Value, field: &str) -> Result<Option<Uuid>, serde_json::Value> {
    match args.get(field).and_then(|v| v.as_str()) {
        None => Ok(None),
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| failure(&format!("Invalid UUID in {}: {}", field, raw))),
    }
}

fn required_status(args: &serde_json::Value) -> Result<TaskStatus, serde_json::Value> {
    let raw = args
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| failure("Missing required field: status"))?;
    TaskStatus::from_str(raw).ok_or_else(|| failure(&format!("Invalid status: {}", raw)))
}

fn tasks_envelope(tasks: &[Task]) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "tasks": tasks.iter().map(task_json).collect::<Vec<_>>(),
    })
}

fn task_json(task: &Task) -> serde_json::Value {
    serde_json::json!({
        "taskId": task.id.to_string(),
        "agentId": task.agent_id.map(|id| id.to_string()),
        "persona": task.persona_id,
        "description": task.description,
        "priority": task.priority.as_str(),
        "status": task.status.as_str(),
        "result": task.result,
        "createdAt": task.created_at.to_rfc3339(),
        "claimedAt": task.claimed_at.map(|t| t.to_rfc3339()),
        "completedAt": task.completed_at.map(|t| t.to_rfc3339()),
    })
}

fn agent_json(agent: &Agent) -> serde_json::Value {
    serde_json::json!({
        "agentId": agent.id.to_string(),
        "persona": agent.persona_id,
        "status": agent.status.as_str(),
        "model": agent.model,
        "worktreeName": agent.worktree_name,
        "processId": agent.process_id,
        "registeredAt": agent.registered_at.to_rfc3339(),
        "lastHeartbeat": agent.last_heartbeat.to_rfc3339(),
        "stoppedAt": agent.stopped_at.map(|t| t.to_rfc3339()),
    })
}

fn entry_json(entry: &MemoryEntry) -> serde_json::Value {
    serde_json::json!({
        "key": entry.key,
        "namespace": entry.namespace,
        "value": entry.value,
        "type": entry.entry_type,
        "metadata": entry.metadata,
        "size": entry.size,
        "isCompressed": entry.is_compressed,
        "createdAt": entry.created_at.to_rfc3339(),
        "lastUpdatedAt": entry.last_updated_at.to_rfc3339(),
        "accessedAt": entry.accessed_at.map(|t| t.to_rfc3339()),
        "accessCount": entry.access_count,
    })
}

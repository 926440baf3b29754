//! Tool-surface tests: JSON-RPC framing and envelope mapping, driven
//! through `StdioServer::handle_message` without a real stdin/stdout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use aiswarm::adapters::mcp::StdioServer;
use aiswarm::domain::errors::DomainResult;
use aiswarm::domain::ports::{LaunchRequest, LaunchedProcess, Launcher};
use aiswarm::services::REQUERY_PREFIX;

use common::Harness;

/// Launcher that pretends every spawn succeeded with a fixed pid.
struct FakeLauncher;

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _request: &LaunchRequest) -> DomainResult<LaunchedProcess> {
        Ok(LaunchedProcess { process_id: 4242 })
    }
}

async fn server() -> (Arc<StdioServer>, CancellationToken) {
    let harness = Harness::new().await;
    let shutdown = CancellationToken::new();
    let server = Arc::new(StdioServer::new(
        harness.registry.clone(),
        harness.coordinator.clone(),
        harness.memory.clone(),
        Arc::new(FakeLauncher),
        "/tmp/swarm".to_string(),
        Duration::from_millis(200),
        shutdown.clone(),
    ));
    (server, shutdown)
}

fn rpc(method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params
    })
    .to_string()
}

fn call(tool: &str, arguments: serde_json::Value) -> String {
    rpc("tools/call", serde_json::json!({ "name": tool, "arguments": arguments }))
}

/// Unpack the `{success, …}` envelope out of an MCP tool response.
fn envelope(response: &str) -> serde_json::Value {
    let parsed: serde_json::Value = serde_json::from_str(response).unwrap();
    let text = parsed["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn initialize_and_tools_list_answer() {
    let (server, _shutdown) = server().await;

    let response = server.handle_message(&rpc("initialize", serde_json::json!({}))).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["result"]["serverInfo"]["name"], "aiswarm");

    let response = server.handle_message(&rpc("tools/list", serde_json::json!({}))).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    let tools = parsed["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "launch_agent",
        "kill_agent",
        "list_agents",
        "create_task",
        "get_next_task",
        "report_task_completion",
        "report_task_failure",
        "get_task_status",
        "get_tasks_by_status",
        "get_tasks_by_agent_id",
        "get_tasks_by_agent_id_and_status",
        "save_memory",
        "read_memory",
        "list_memory",
        "wait_for_memory_key",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }

    // Notifications get no response.
    assert!(server
        .handle_message(&rpc("notifications/initialized", serde_json::json!({})))
        .await
        .is_none());
}

#[tokio::test]
async fn launch_then_dispatch_round_trip() {
    let (server, _shutdown) = server().await;

    let response = server
        .handle_message(&call(
            "launch_agent",
            serde_json::json!({ "persona": "implementer", "description": "work the queue" }),
        ))
        .await
        .unwrap();
    let launched = envelope(&response);
    assert_eq!(launched["success"], true);
    assert_eq!(launched["processId"], 4242);
    let agent_id = launched["agentId"].as_str().unwrap().to_string();

    let response = server
        .handle_message(&call(
            "create_task",
            serde_json::json!({
                "persona": "implementer",
                "description": "Implement feature X",
                "priority": "high"
            }),
        ))
        .await
        .unwrap();
    let created = envelope(&response);
    assert_eq!(created["success"], true);
    let task_id = created["taskId"].as_str().unwrap().to_string();

    let response = server
        .handle_message(&call(
            "get_next_task",
            serde_json::json!({ "agentId": agent_id, "waitMillis": 1000 }),
        ))
        .await
        .unwrap();
    let dispatched = envelope(&response);
    assert_eq!(dispatched["success"], true);
    assert_eq!(dispatched["taskId"], task_id.as_str());
    assert_eq!(dispatched["description"], "Implement feature X");
    assert_eq!(dispatched["persona"], "implementer");

    let response = server
        .handle_message(&call(
            "report_task_completion",
            serde_json::json!({ "taskId": task_id, "result": "done" }),
        ))
        .await
        .unwrap();
    assert_eq!(envelope(&response)["success"], true);

    // A second completion is a structured failure, not a protocol error.
    let response = server
        .handle_message(&call(
            "report_task_completion",
            serde_json::json!({ "taskId": task_id, "result": "again" }),
        ))
        .await
        .unwrap();
    let rejected = envelope(&response);
    assert_eq!(rejected["success"], false);
    assert!(rejected["errorMessage"].as_str().unwrap().contains("terminal"));
}

#[tokio::test]
async fn get_next_task_times_out_with_requery_sentinel() {
    let (server, _shutdown) = server().await;

    let response = server
        .handle_message(&call(
            "launch_agent",
            serde_json::json!({ "persona": "implementer", "description": "idle" }),
        ))
        .await
        .unwrap();
    let agent_id = envelope(&response)["agentId"].as_str().unwrap().to_string();

    let response = server
        .handle_message(&call(
            "get_next_task",
            serde_json::json!({ "agentId": agent_id, "waitMillis": 50 }),
        ))
        .await
        .unwrap();
    let outcome = envelope(&response);
    assert_eq!(outcome["success"], true);
    assert!(outcome["taskId"].as_str().unwrap().starts_with(REQUERY_PREFIX));
}

#[tokio::test]
async fn memory_tools_round_trip() {
    let (server, _shutdown) = server().await;

    let response = server
        .handle_message(&call(
            "save_memory",
            serde_json::json!({ "key": "k1", "value": "v1", "namespace": "ns" }),
        ))
        .await
        .unwrap();
    assert_eq!(envelope(&response)["success"], true);

    let response = server
        .handle_message(&call("read_memory", serde_json::json!({ "key": "k1", "namespace": "ns" })))
        .await
        .unwrap();
    let read = envelope(&response);
    assert_eq!(read["success"], true);
    assert_eq!(read["entry"]["value"], "v1");
    assert_eq!(read["entry"]["accessCount"], 1);

    let response = server
        .handle_message(&call("read_memory", serde_json::json!({ "key": "nope", "namespace": "ns" })))
        .await
        .unwrap();
    assert_eq!(envelope(&response)["success"], false);

    let response = server
        .handle_message(&call("list_memory", serde_json::json!({ "namespace": "ns" })))
        .await
        .unwrap();
    let listed = envelope(&response);
    assert_eq!(listed["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wait_for_memory_key_blocks_until_save() {
    let (server, _shutdown) = server().await;

    let waiter_server = server.clone();
    let waiter = tokio::spawn(async move {
        waiter_server
            .handle_message(&call(
                "wait_for_memory_key",
                serde_json::json!({
                    "key": "shared",
                    "namespace": "ns",
                    "timeoutMillis": 10_000,
                    "mode": "creation"
                }),
            ))
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    let response = server
        .handle_message(&call(
            "save_memory",
            serde_json::json!({ "key": "shared", "value": "payload", "namespace": "ns" }),
        ))
        .await
        .unwrap();
    assert_eq!(envelope(&response)["success"], true);

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter did not wake within a second")
        .unwrap();
    let outcome = envelope(&woke);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["entry"]["value"], "payload");
}

#[tokio::test]
async fn malformed_and_unknown_requests_are_contained() {
    let (server, _shutdown) = server().await;

    let response = server.handle_message("this is not json").await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["error"]["code"], -32700);

    let response = server.handle_message(&rpc("no/such/method", serde_json::json!({}))).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["error"]["code"], -32601);

    let response = server
        .handle_message(&call("no_such_tool", serde_json::json!({})))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["result"]["isError"], true);

    // Bad arguments surface as structured envelopes.
    let response = server
        .handle_message(&call("kill_agent", serde_json::json!({ "agentId": "not-a-uuid" })))
        .await
        .unwrap();
    assert_eq!(envelope(&response)["success"], false);
}

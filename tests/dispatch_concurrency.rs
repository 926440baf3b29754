//! Dispatch guarantees under contention: at-most-one claim, assignment
//! pinning, and priority ordering.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use aiswarm::domain::models::{TaskPriority, TaskStatus};
use aiswarm::services::{GetNextOutcome, NewTaskRequest};

use common::Harness;

fn request(agent_id: Option<Uuid>, persona: &str, description: &str, priority: TaskPriority) -> NewTaskRequest {
    NewTaskRequest {
        agent_id,
        persona_id: persona.to_string(),
        description: description.to_string(),
        priority,
    }
}

// Many agents race for fewer tasks: every task is claimed exactly once and
// the losers time out with sentinels.
#[tokio::test]
async fn every_task_is_claimed_exactly_once_under_contention() {
    let harness = Harness::new().await;
    let token = CancellationToken::new();

    let mut agents = Vec::new();
    for i in 0..6 {
        agents.push(harness.register_running("implementer", 300 + i).await);
    }

    let mut task_ids = HashSet::new();
    for i in 0..4 {
        let id = harness
            .coordinator
            .create(request(None, "implementer", &format!("job {i}"), TaskPriority::Normal))
            .await
            .unwrap();
        task_ids.insert(id);
    }

    let polls = agents.into_iter().map(|agent_id| {
        let coordinator = harness.coordinator.clone();
        let token = token.clone();
        tokio::spawn(async move {
            coordinator
                .get_next(agent_id, Duration::from_millis(300), &token)
                .await
                .unwrap()
        })
    });

    let mut claimed = Vec::new();
    let mut sentinels = 0;
    for poll in futures::future::join_all(polls).await {
        match poll.unwrap() {
            GetNextOutcome::Task(task) => claimed.push(task.task_id),
            GetNextOutcome::TimedOut { .. } => sentinels += 1,
            GetNextOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    // Four distinct winners, two empty-handed agents.
    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 4);
    assert_eq!(unique, task_ids);
    assert_eq!(sentinels, 2);
}

// A task pinned to agent A is never dispatched to agent B, even when B has
// the same persona and polls first.
#[tokio::test]
async fn pinned_tasks_are_never_dispatched_elsewhere() {
    let harness = Harness::new().await;
    let token = CancellationToken::new();

    let owner = harness.register_running("implementer", 400).await;
    let bystander = harness.register_running("implementer", 401).await;

    let pinned = harness
        .coordinator
        .create(request(Some(owner), "implementer", "pinned work", TaskPriority::Critical))
        .await
        .unwrap();

    let outcome = harness
        .coordinator
        .get_next(bystander, Duration::from_millis(100), &token)
        .await
        .unwrap();
    assert!(matches!(outcome, GetNextOutcome::TimedOut { .. }));

    let outcome = harness
        .coordinator
        .get_next(owner, Duration::from_millis(100), &token)
        .await
        .unwrap();
    match outcome {
        GetNextOutcome::Task(task) => assert_eq!(task.task_id, pinned),
        other => panic!("owner should receive its pinned task, got {other:?}"),
    }
}

// Higher priority wins; equal priority goes to the older task.
#[tokio::test]
async fn dispatch_order_is_priority_then_age() {
    let harness = Harness::new().await;
    let token = CancellationToken::new();

    let agent_id = harness.register_running("implementer", 500).await;

    let low = harness
        .coordinator
        .create(request(None, "implementer", "low", TaskPriority::Low))
        .await
        .unwrap();
    harness.clock.advance(chrono::Duration::seconds(1));
    let critical_old = harness
        .coordinator
        .create(request(None, "implementer", "critical old", TaskPriority::Critical))
        .await
        .unwrap();
    harness.clock.advance(chrono::Duration::seconds(1));
    let critical_new = harness
        .coordinator
        .create(request(None, "implementer", "critical new", TaskPriority::Critical))
        .await
        .unwrap();
    harness.clock.advance(chrono::Duration::seconds(1));
    let high = harness
        .coordinator
        .create(request(None, "implementer", "high", TaskPriority::High))
        .await
        .unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        let outcome = harness
            .coordinator
            .get_next(agent_id, Duration::from_millis(200), &token)
            .await
            .unwrap();
        let GetNextOutcome::Task(task) = outcome else {
            panic!("expected a task");
        };
        harness.coordinator.report_completion(task.task_id, "done").await.unwrap();
        order.push(task.task_id);
    }

    assert_eq!(order, [critical_old, critical_new, high, low]);
}

// Completing a pending task directly (never claimed) is legal and removes it
// from dispatch.
#[tokio::test]
async fn pending_task_can_be_finalized_directly() {
    let harness = Harness::new().await;
    let token = CancellationToken::new();

    let agent_id = harness.register_running("implementer", 600).await;
    let task_id = harness
        .coordinator
        .create(request(None, "implementer", "obsolete", TaskPriority::Normal))
        .await
        .unwrap();

    harness.coordinator.report_failure(task_id, "cancelled by planner").await.unwrap();

    let task = harness.coordinator.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.claimed_at.is_none());

    let outcome = harness
        .coordinator
        .get_next(agent_id, Duration::from_millis(100), &token)
        .await
        .unwrap();
    assert!(matches!(outcome, GetNextOutcome::TimedOut { .. }));
}

// Read-only task queries used by the tool surface.
#[tokio::test]
async fn task_queries_filter_by_agent_and_status() {
    let harness = Harness::new().await;
    let token = CancellationToken::new();

    let agent_id = harness.register_running("implementer", 700).await;
    let done = harness
        .coordinator
        .create(request(Some(agent_id), "implementer", "a", TaskPriority::Normal))
        .await
        .unwrap();
    let GetNextOutcome::Task(_) = harness
        .coordinator
        .get_next(agent_id, Duration::from_millis(200), &token)
        .await
        .unwrap()
    else {
        panic!("expected a task");
    };
    harness.coordinator.report_completion(done, "done").await.unwrap();

    harness
        .coordinator
        .create(request(Some(agent_id), "implementer", "b", TaskPriority::Normal))
        .await
        .unwrap();

    let all = harness.coordinator.tasks_by_agent(agent_id).await.unwrap();
    assert_eq!(all.len(), 2);

    let completed = harness
        .coordinator
        .tasks_by_agent_and_status(agent_id, TaskStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done);

    let pending = harness.coordinator.tasks_by_status(TaskStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
}

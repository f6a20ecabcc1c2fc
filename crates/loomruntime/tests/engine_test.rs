mod common;

use common::{collect_until_completed, constant, registry, sleep};
use loomcore::{events, ExecutionEvent, NodeData, RunStatus, Value, WorkflowGraph};
use loomruntime::{EngineConfig, WorkflowEngine};
use std::time::Duration;

fn completion(events: &[ExecutionEvent]) -> (bool, String, Option<RunStatus>) {
    match events.last() {
        Some(ExecutionEvent::Completed {
            success,
            message,
            report,
            ..
        }) => (*success, message.clone(), report.as_ref().map(|r| r.status)),
        other => panic!("expected completion event, got {:?}", other),
    }
}

fn chain() -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", constant("abc"));
    graph.add_node("n2", NodeData::new("concat"));
    graph.connect("n1", "value", "n2", "a");
    graph
}

#[tokio::test]
async fn test_submit_and_complete() {
    let engine = WorkflowEngine::new(registry());
    let (tx, mut rx) = events::channel();
    let id = engine.execute_workflow(&chain(), Some(tx));

    let events = collect_until_completed(&mut rx).await;
    let (success, message, status) = completion(&events);
    assert!(success);
    assert_eq!(message, "Workflow completed successfully");
    assert_eq!(status, Some(RunStatus::Completed));
    assert!(events.iter().all(|e| e.execution_id() == id));

    let Some(ExecutionEvent::Completed { report: Some(report), .. }) = events.last() else {
        unreachable!();
    };
    assert_eq!(report.output("n2", "value"), Some(&Value::from("abc")));

    assert!(!engine.is_execution_running(id));
    assert!(engine.get_execution_status(id).is_none());
}

#[tokio::test]
async fn test_graph_snapshot_taken_at_submission() {
    let engine = WorkflowEngine::new(registry());
    let (tx, mut rx) = events::channel();
    let mut graph = chain();
    engine.execute_workflow(&graph, Some(tx));
    graph.add_node("n3", NodeData::new("fail"));

    let events = collect_until_completed(&mut rx).await;
    assert_eq!(completion(&events).2, Some(RunStatus::Completed));
}

#[tokio::test]
async fn test_validation_failure_reported() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = WorkflowGraph::new();
    graph.add_node("a", NodeData::new("concat"));
    graph.add_node("b", NodeData::new("concat"));
    graph.connect("a", "value", "b", "a");
    graph.connect("b", "value", "a", "a");

    let (tx, mut rx) = events::channel();
    engine.execute_workflow(&graph, Some(tx));
    let events = collect_until_completed(&mut rx).await;
    let (success, message, status) = completion(&events);
    assert!(!success);
    assert!(message.starts_with("Workflow validation failed"));
    assert!(message.contains("Circular dependency"));
    assert_eq!(status, None);
    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::NodeStatus { .. })));
}

#[tokio::test]
async fn test_validation_warning_is_not_fatal() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", constant("solo"));

    let (tx, mut rx) = events::channel();
    engine.execute_workflow(&graph, Some(tx));
    let events = collect_until_completed(&mut rx).await;
    assert!(completion(&events).0);
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::Log { message, .. } if message == "Workflow has nodes but no connections"
    )));
}

#[tokio::test]
async fn test_partial_failure_is_success_with_errors() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = chain();
    graph.add_node("n3", NodeData::new("fail"));

    let (tx, mut rx) = events::channel();
    engine.execute_workflow(&graph, Some(tx));
    let events = collect_until_completed(&mut rx).await;
    let (success, message, status) = completion(&events);
    assert!(success);
    assert_eq!(status, Some(RunStatus::CompletedWithErrors));
    assert_eq!(message, "Workflow completed with 1 failed node(s)");
}

#[tokio::test]
async fn test_status_while_running() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", sleep(200.0));
    graph.add_node("n2", sleep(10.0));
    graph.connect("n1", "value", "n2", "value");

    let (tx, mut rx) = events::channel();
    let id = engine.execute_workflow(&graph, Some(tx));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(engine.is_execution_running(id));
    assert!(engine.has_active_executions());
    let status = engine.get_execution_status(id).unwrap();
    assert_eq!(status.status, RunStatus::Running);
    assert_eq!(status.current_node.as_deref(), Some("n1"));
    assert_eq!(status.progress, 0.0);
    assert_eq!(engine.get_all_execution_statuses().len(), 1);

    collect_until_completed(&mut rx).await;
    assert!(!engine.has_active_executions());
}

#[tokio::test]
async fn test_stop_running_execution() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", sleep(200.0));
    graph.add_node("n2", constant("x"));
    graph.connect("n1", "value", "n2", "value");

    let (tx, mut rx) = events::channel();
    let id = engine.execute_workflow(&graph, Some(tx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.stop_execution(Some(id)));

    let events = collect_until_completed(&mut rx).await;
    let (success, message, status) = completion(&events);
    assert!(!success);
    assert_eq!(message, "Workflow execution stopped");
    assert_eq!(status, Some(RunStatus::Stopped));
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::Log { message, .. } if message == "Stop requested"
    )));
}

#[tokio::test]
async fn test_queued_run_never_starts_after_stop() {
    let engine = WorkflowEngine::with_config(registry(), EngineConfig { max_workers: 1 });

    let mut slow = WorkflowGraph::new();
    slow.add_node("n1", sleep(200.0));
    let (tx1, mut rx1) = events::channel();
    engine.execute_workflow(&slow, Some(tx1));
    tokio::time::sleep(Duration::from_millis(30)).await;

    let (tx2, mut rx2) = events::channel();
    let queued = engine.execute_workflow(&chain(), Some(tx2));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        engine.get_execution_status(queued).map(|s| s.status),
        Some(RunStatus::Pending)
    );
    assert_eq!(engine.stats().available_workers, 0);

    engine.stop_execution(Some(queued));
    let events = collect_until_completed(&mut rx2).await;
    let (success, _, status) = completion(&events);
    assert!(!success);
    assert_eq!(status, None);
    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::NodeStatus { .. })));

    let first = collect_until_completed(&mut rx1).await;
    assert_eq!(completion(&first).2, Some(RunStatus::Completed));
}

#[tokio::test]
async fn test_stop_all_drains_and_refuses_new_work() {
    let engine = WorkflowEngine::with_config(registry(), EngineConfig { max_workers: 2 });
    let mut receivers = Vec::new();
    for _ in 0..3 {
        let mut graph = WorkflowGraph::new();
        graph.add_node("n1", sleep(100.0));
        graph.add_node("n2", constant("x"));
        graph.connect("n1", "value", "n2", "value");
        let (tx, rx) = events::channel();
        engine.execute_workflow(&graph, Some(tx));
        receivers.push(rx);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.stop_all_executions().await;
    assert!(!engine.has_active_executions());
    assert!(!engine.stats().accepting);

    for mut rx in receivers {
        let events = collect_until_completed(&mut rx).await;
        assert!(!completion(&events).0);
    }

    let (tx, mut rx) = events::channel();
    engine.execute_workflow(&chain(), Some(tx));
    let events = collect_until_completed(&mut rx).await;
    let (success, message, _) = completion(&events);
    assert!(!success);
    assert!(message.contains("shutting down"));
}

#[tokio::test]
async fn test_pool_bounds_concurrency() {
    let engine = WorkflowEngine::with_config(registry(), EngineConfig { max_workers: 2 });
    let mut receivers = Vec::new();
    for _ in 0..4 {
        let mut graph = WorkflowGraph::new();
        graph.add_node("n1", sleep(100.0));
        let (tx, rx) = events::channel();
        engine.execute_workflow(&graph, Some(tx));
        receivers.push(rx);
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    let running = engine
        .get_all_execution_statuses()
        .iter()
        .filter(|s| s.status == RunStatus::Running)
        .count();
    assert_eq!(running, 2);

    for mut rx in receivers {
        let events = collect_until_completed(&mut rx).await;
        assert!(completion(&events).0);
    }
    assert_eq!(engine.stats().total_submitted, 4);
}

#[tokio::test]
async fn test_validate_workflow_passthrough() {
    let engine = WorkflowEngine::new(registry());
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", NodeData::new("mystery"));
    let issues = engine.validate_workflow(&graph);
    assert!(issues.iter().any(|i| i.is_error()));
    assert_eq!(engine.validate_workflow(&graph), issues);
}

mod common;

use common::{collect_until_completed, registry};
use loomcore::{
    events, ExecutionEvent, NodeData, NodeStatus, RunReport, RunStatus, Value, WorkflowDocument,
    WorkflowGraph,
};
use loomruntime::WorkflowEngine;

async fn run_to_report(graph: &WorkflowGraph) -> (Vec<ExecutionEvent>, RunReport) {
    let engine = WorkflowEngine::new(registry());
    let (tx, mut rx) = events::channel();
    engine.execute_workflow(graph, Some(tx));
    let mut events = collect_until_completed(&mut rx).await;
    match events.pop() {
        Some(ExecutionEvent::Completed {
            report: Some(report),
            ..
        }) => (events, *report),
        other => panic!("expected a completed run with a report, got {:?}", other),
    }
}

#[tokio::test]
async fn test_text_pipeline() {
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", NodeData::new("text_input").with_property("text", "abc"));
    graph.add_node("n2", NodeData::new("text_processor").with_property("operation", "uppercase"));
    graph.connect("n1", "text", "n2", "text");

    let (events, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.execution_order, vec!["n1".to_string(), "n2".to_string()]);
    assert_eq!(report.output("n2", "result"), Some(&Value::from("ABC")));
    assert_eq!(report.output("n2", "length"), Some(&Value::from(3.0)));

    let statuses: Vec<(String, NodeStatus)> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeStatus { node_id, status, .. } => Some((node_id.clone(), *status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("n1".to_string(), NodeStatus::Running),
            ("n1".to_string(), NodeStatus::Success),
            ("n2".to_string(), NodeStatus::Running),
            ("n2".to_string(), NodeStatus::Success),
        ]
    );
}

#[tokio::test]
async fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("nested").join("data.json");
    let path_str = path.to_string_lossy().into_owned();

    // Ready nodes run in id order, so the read follows the write.
    let mut graph = WorkflowGraph::new();
    graph.add_node(
        "a_source",
        NodeData::new("json_input").with_property("json_text", r#"{"a": 1}"#),
    );
    graph.add_node(
        "b_write",
        NodeData::new("file_output")
            .with_property("file_path", path_str.as_str())
            .with_property("format", "json"),
    );
    graph.add_node(
        "c_read",
        NodeData::new("file_input").with_property("file_path", path_str.as_str()),
    );
    graph.connect("a_source", "data", "b_write", "data");

    let (_, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    assert_eq!(report.output("b_write", "bytes_written"), Some(&Value::from(12.0)));
    assert_eq!(
        report.output("c_read", "content"),
        Some(&Value::from("{\n  \"a\": 1\n}"))
    );
    assert_eq!(report.output("c_read", "filename"), Some(&Value::from("data.json")));
    assert_eq!(report.output("c_read", "size"), Some(&Value::from(12.0)));
}

#[tokio::test]
async fn test_file_append_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.txt");
    let path_str = path.to_string_lossy().into_owned();

    let mut graph = WorkflowGraph::new();
    for (id, text) in [("first", "one"), ("second", "two")] {
        graph.add_node(&format!("{}_text", id), NodeData::new("text_input").with_property("text", text));
        graph.add_node(
            id,
            NodeData::new("file_output")
                .with_property("file_path", path_str.as_str())
                .with_property("append", true),
        );
        graph.connect(&format!("{}_text", id), "text", id, "data");
    }

    let (_, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "one\ntwo\n");
}

#[tokio::test]
async fn test_missing_file_fails_only_that_branch() {
    let mut graph = WorkflowGraph::new();
    graph.add_node(
        "missing",
        NodeData::new("file_input").with_property("file_path", "/definitely/not/here.txt"),
    );
    graph.add_node("count", NodeData::new("text_processor").with_property("operation", "word_count"));
    graph.add_node("other", NodeData::new("number_input").with_property("value", 7.0));
    graph.connect("missing", "content", "count", "text");

    let (_, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::CompletedWithErrors);
    assert!(report.failed_nodes.contains("missing"));
    assert!(report.failed_nodes.contains("count"));
    assert!(report.completed_nodes.contains("other"));
    assert!(report.errors[0].contains("File not found"));
}

#[tokio::test]
async fn test_variables_flow_between_nodes() {
    let mut graph = WorkflowGraph::new();
    graph.add_node("a_value", NodeData::new("number_input").with_property("value", 5.0));
    graph.add_node("b_store", NodeData::new("variable_output").with_property("variable_name", "limit"));
    graph.add_node("c_load", NodeData::new("variable_input").with_property("variable_name", "limit"));
    graph.add_node("d_double", NodeData::new("math").with_property("operation", "multiply"));
    graph.connect("a_value", "number", "b_store", "value");
    graph.connect("c_load", "value", "d_double", "a");
    graph.connect("a_value", "number", "d_double", "b");

    let (_, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    assert_eq!(
        report.execution_order,
        vec!["a_value", "b_store", "c_load", "d_double"]
    );
    assert_eq!(report.output("c_load", "exists"), Some(&Value::from(true)));
    assert_eq!(report.output("d_double", "result"), Some(&Value::from(25.0)));
}

#[tokio::test]
async fn test_saved_document_runs() {
    let mut graph = WorkflowGraph::new();
    graph.add_node("n1", NodeData::new("text_input").with_property("text", "  padded  "));
    graph.add_node("n2", NodeData::new("text_processor").with_property("operation", "strip"));
    graph.add_node("n3", NodeData::new("text_output").with_property("suffix", "!"));
    graph.connect("n1", "text", "n2", "text");
    graph.connect("n2", "result", "n3", "text");

    let json = WorkflowDocument::from_graph("Strip", graph)
        .to_json_pretty()
        .unwrap();
    let loaded = WorkflowDocument::from_json(&json).unwrap().into_graph();

    let (_, report) = run_to_report(&loaded).await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    assert_eq!(report.output("n3", "output"), Some(&Value::from("padded!")));
}

#[tokio::test]
async fn test_csv_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.csv");
    let path_str = path.to_string_lossy().into_owned();

    let rows = r#"[
        {"name": "ada", "quote": "hello, world"},
        {"name": "alan", "quote": "he said \"hi\"\nand left"}
    ]"#;
    let mut graph = WorkflowGraph::new();
    graph.add_node("a_rows", NodeData::new("json_input").with_property("json_text", rows));
    graph.add_node(
        "b_write",
        NodeData::new("file_output")
            .with_property("file_path", path_str.as_str())
            .with_property("format", "csv"),
    );
    graph.add_node(
        "c_read",
        NodeData::new("file_input").with_property("file_path", path_str.as_str()),
    );
    graph.add_node(
        "d_parse",
        NodeData::new("transform").with_property("transform_type", "csv_to_json"),
    );
    graph.connect("a_rows", "data", "b_write", "data");
    graph.connect("c_read", "content", "d_parse", "data");

    let (_, report) = run_to_report(&graph).await;
    assert_eq!(report.status, RunStatus::Completed, "{:?}", report.errors);
    assert_eq!(
        report.output("d_parse", "result"),
        Some(&Value::from(serde_json::json!([
            {"name": "ada", "quote": "hello, world"},
            {"name": "alan", "quote": "he said \"hi\"\nand left"}
        ])))
    );
}

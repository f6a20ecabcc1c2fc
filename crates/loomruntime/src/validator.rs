use crate::order::DependencyGraph;
use crate::registry::NodeRegistry;
use loomcore::{
    pin, Connection, IssueKind, NodeData, PinSpec, ValidationIssue, WorkflowError, WorkflowGraph,
};
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use std::collections::HashMap;
use std::sync::Arc;

/// Structural checks run before a workflow executes.
///
/// Validation never mutates the graph; calling it twice on the same graph
/// yields the same issues.
#[derive(Clone)]
pub struct GraphValidator {
    registry: Arc<NodeRegistry>,
}

impl GraphValidator {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn validate(&self, graph: &WorkflowGraph) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (node_id, node) in &graph.nodes {
            self.check_node(node_id, node, &mut issues);
        }

        for (conn_id, conn) in &graph.connections {
            self.check_connection(conn_id, conn, graph, &mut issues);
        }

        check_duplicate_inputs(graph, &mut issues);
        check_cycles(graph, &mut issues);

        if !graph.nodes.is_empty() && graph.connections.is_empty() {
            issues.push(ValidationIssue::warning(
                IssueKind::NoConnections,
                "Workflow has nodes but no connections",
            ));
        }

        issues
    }

    /// Validate and fold error-severity issues into a single error.
    pub fn ensure_valid(&self, graph: &WorkflowGraph) -> Result<Vec<ValidationIssue>, WorkflowError> {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            self.validate(graph).into_iter().partition(ValidationIssue::is_error);
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(WorkflowError::ValidationFailed(errors))
        }
    }

    fn check_node(&self, node_id: &str, node: &NodeData, issues: &mut Vec<ValidationIssue>) {
        if node.node_type.is_empty() {
            issues.push(
                ValidationIssue::error(
                    IssueKind::MissingNodeType,
                    format!("Node {}: Missing node type", node_id),
                )
                .on_node(node_id),
            );
        }
        if node.position.is_none() {
            issues.push(
                ValidationIssue::error(
                    IssueKind::MissingPosition,
                    format!("Node {}: Missing position", node_id),
                )
                .on_node(node_id),
            );
        }
        if node.node_type.is_empty() {
            return;
        }

        let Some(schema) = self.registry.get_schema(&node.node_type) else {
            issues.push(
                ValidationIssue::error(
                    IssueKind::UnknownNodeType,
                    format!("Node {}: Unknown node type '{}'", node_id, node.node_type),
                )
                .on_node(node_id),
            );
            return;
        };

        for prop in schema.required_properties() {
            let present = node.properties.get(&prop.name).is_some_and(|v| !v.is_null());
            if !present && !prop.has_default() {
                issues.push(
                    ValidationIssue::error(
                        IssueKind::MissingProperty,
                        format!("Node {}: Missing required property '{}'", node_id, prop.name),
                    )
                    .on_node(node_id),
                );
            }
        }
    }

    fn check_connection(
        &self,
        conn_id: &str,
        conn: &Connection,
        graph: &WorkflowGraph,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let fields = [
            ("from_node", &conn.from_node),
            ("from_pin", &conn.from_pin),
            ("to_node", &conn.to_node),
            ("to_pin", &conn.to_pin),
        ];
        let mut complete = true;
        for (field, value) in fields {
            if value.is_empty() {
                complete = false;
                issues.push(
                    ValidationIssue::error(
                        IssueKind::MissingConnectionField,
                        format!("Connection {}: Missing field '{}'", conn_id, field),
                    )
                    .on_connection(conn_id),
                );
            }
        }

        let from = graph.nodes.get(&conn.from_node);
        let to = graph.nodes.get(&conn.to_node);
        if !conn.from_node.is_empty() && from.is_none() {
            issues.push(
                ValidationIssue::error(
                    IssueKind::UnknownNode,
                    format!("Connection {}: Source node '{}' not found", conn_id, conn.from_node),
                )
                .on_connection(conn_id),
            );
        }
        if !conn.to_node.is_empty() && to.is_none() {
            issues.push(
                ValidationIssue::error(
                    IssueKind::UnknownNode,
                    format!("Connection {}: Target node '{}' not found", conn_id, conn.to_node),
                )
                .on_connection(conn_id),
            );
        }

        let (Some(from), Some(to)) = (from, to) else {
            return;
        };
        if !complete {
            return;
        }

        let Some(outputs) = self.pins(from, Direction::Output) else {
            return;
        };
        let Some(from_pin) = outputs.iter().find(|p| p.name == conn.from_pin) else {
            issues.push(
                ValidationIssue::error(
                    IssueKind::UnknownPin,
                    format!(
                        "Connection {}: Output pin '{}' not found in source node",
                        conn_id, conn.from_pin
                    ),
                )
                .on_connection(conn_id),
            );
            return;
        };

        let Some(inputs) = self.pins(to, Direction::Input) else {
            return;
        };
        let Some(to_pin) = inputs.iter().find(|p| p.name == conn.to_pin) else {
            issues.push(
                ValidationIssue::error(
                    IssueKind::UnknownPin,
                    format!(
                        "Connection {}: Input pin '{}' not found in target node",
                        conn_id, conn.to_pin
                    ),
                )
                .on_connection(conn_id),
            );
            return;
        };

        if !pin::compatible(&from_pin.pin_type, &to_pin.pin_type) {
            issues.push(
                ValidationIssue::error(
                    IssueKind::IncompatibleTypes,
                    format!(
                        "Connection {}: Incompatible types: {} -> {}",
                        conn_id, from_pin.pin_type, to_pin.pin_type
                    ),
                )
                .on_connection(conn_id),
            );
        }
    }

    /// Pins the node declares, falling back to its schema when it declares none.
    /// `None` when neither is available.
    fn pins(&self, node: &NodeData, direction: Direction) -> Option<Vec<PinSpec>> {
        let declared = match direction {
            Direction::Input => &node.inputs,
            Direction::Output => &node.outputs,
        };
        if !declared.is_empty() {
            return Some(declared.clone());
        }
        self.registry.get_schema(&node.node_type).map(|s| match direction {
            Direction::Input => s.inputs.clone(),
            Direction::Output => s.outputs.clone(),
        })
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

fn check_duplicate_inputs(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let mut seen: HashMap<(&str, &str), &str> = HashMap::new();
    for (conn_id, conn) in &graph.connections {
        if conn.to_node.is_empty() || conn.to_pin.is_empty() {
            continue;
        }
        let key = (conn.to_node.as_str(), conn.to_pin.as_str());
        if let Some(first) = seen.get(&key) {
            issues.push(
                ValidationIssue::error(
                    IssueKind::DuplicateInput,
                    format!(
                        "Connection {}: Input pin '{}' of node '{}' is already connected by {}",
                        conn_id, conn.to_pin, conn.to_node, first
                    ),
                )
                .on_node(conn.to_node.clone())
                .on_connection(conn_id),
            );
        } else {
            seen.insert(key, conn_id);
        }
    }
}

fn check_cycles(graph: &WorkflowGraph, issues: &mut Vec<ValidationIssue>) {
    let deps = DependencyGraph::build(graph);
    let g = deps.graph();
    if !is_cyclic_directed(g) {
        return;
    }

    let mut nodes: Vec<String> = tarjan_scc(g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || g.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|idx| g[idx].clone())
        .collect();
    nodes.sort();

    issues.push(ValidationIssue::error(
        IssueKind::CyclicGraph,
        WorkflowError::CyclicGraph { nodes }.to_string(),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Severity};

    #[derive(Default)]
    struct Source;

    #[async_trait]
    impl Node for Source {
        fn schema() -> NodeSchema {
            NodeSchema::new("source", "Source", "", "Input")
                .output("text", "string", "")
                .output("count", "number", "")
                .property("text", "string", "Text", "", loomcore::Value::Null, true)
        }

        async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::new())
        }
    }

    #[derive(Default)]
    struct Sink;

    #[async_trait]
    impl Node for Sink {
        fn schema() -> NodeSchema {
            NodeSchema::new("sink", "Sink", "", "Output")
                .input("text", "text", "", true)
                .output("text", "string", "")
        }

        async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::new())
        }
    }

    fn validator() -> GraphValidator {
        let mut registry = NodeRegistry::new();
        registry.register_node::<Source>();
        registry.register_node::<Sink>();
        GraphValidator::new(Arc::new(registry))
    }

    fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_valid_graph() {
        let mut g = WorkflowGraph::new();
        g.add_node("n1", NodeData::new("source").with_property("text", "x"));
        g.add_node("n2", NodeData::new("sink"));
        g.connect("n1", "text", "n2", "text");
        assert!(validator().validate(&g).is_empty());
    }

    #[test]
    fn test_node_checks() {
        let mut g = WorkflowGraph::new();
        let mut no_position = NodeData::new("sink");
        no_position.position = None;
        g.add_node("a", no_position);
        g.add_node("b", NodeData::new("mystery"));
        g.add_node("c", NodeData::new("source"));
        g.add_node("d", NodeData::new(""));

        let issues = validator().validate(&g);
        assert_eq!(
            kinds(&issues),
            vec![
                IssueKind::MissingPosition,
                IssueKind::UnknownNodeType,
                IssueKind::MissingProperty,
                IssueKind::MissingNodeType,
                IssueKind::NoConnections,
            ]
        );
        assert_eq!(issues[2].message, "Node c: Missing required property 'text'");
        assert_eq!(issues[4].severity, Severity::Warning);
    }

    #[test]
    fn test_connection_checks() {
        let mut g = WorkflowGraph::new();
        g.add_node("n1", NodeData::new("source").with_property("text", "x"));
        g.add_node("n2", NodeData::new("sink"));
        g.connections.insert("c1".into(), Connection::new("n1", "", "n2", "text"));
        g.connections.insert("c2".into(), Connection::new("ghost", "text", "n2", "text"));
        g.connections.insert("c3".into(), Connection::new("n1", "nope", "n2", "other"));
        g.connections.insert("c4".into(), Connection::new("n1", "count", "n2", "text"));

        let issues = validator().validate(&g);
        let by_conn = |id: &str| -> Vec<IssueKind> {
            issues
                .iter()
                .filter(|i| i.connection_id.as_deref() == Some(id) && i.kind != IssueKind::DuplicateInput)
                .map(|i| i.kind)
                .collect()
        };
        assert_eq!(by_conn("c1"), vec![IssueKind::MissingConnectionField]);
        assert_eq!(by_conn("c2"), vec![IssueKind::UnknownNode]);
        assert_eq!(by_conn("c3"), vec![IssueKind::UnknownPin]);
        assert_eq!(by_conn("c4"), vec![IssueKind::IncompatibleTypes]);
        assert!(issues.iter().any(|i| i.message.contains("Incompatible types: number -> text")));
    }

    #[test]
    fn test_duplicate_input_connection() {
        let mut g = WorkflowGraph::new();
        g.add_node("n1", NodeData::new("source").with_property("text", "x"));
        g.add_node("n2", NodeData::new("source").with_property("text", "y"));
        g.add_node("n3", NodeData::new("sink"));
        g.connect("n1", "text", "n3", "text");
        g.connect("n2", "text", "n3", "text");

        let issues = validator().validate(&g);
        assert_eq!(kinds(&issues), vec![IssueKind::DuplicateInput]);
        assert_eq!(issues[0].connection_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_cycle_and_self_connection() {
        let mut g = WorkflowGraph::new();
        g.add_node("a", NodeData::new("sink"));
        g.add_node("b", NodeData::new("sink"));
        g.add_node("c", NodeData::new("sink"));
        g.connect("a", "text", "b", "text");
        g.connect("b", "text", "a", "text");
        g.connect("c", "text", "c", "text");

        let issues = validator().validate(&g);
        assert_eq!(kinds(&issues), vec![IssueKind::CyclicGraph]);
        assert_eq!(
            issues[0].message,
            "Circular dependency detected involving nodes: a, b, c"
        );
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut g = WorkflowGraph::new();
        g.add_node("a", NodeData::new("mystery"));
        g.add_node("b", NodeData::new("sink"));
        g.connect("a", "x", "b", "text");
        let v = validator();
        assert_eq!(v.validate(&g), v.validate(&g));
    }
}

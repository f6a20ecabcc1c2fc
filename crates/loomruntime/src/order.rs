use loomcore::{NodeId, WorkflowError, WorkflowGraph};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Node-level dependency graph induced by a workflow's connections.
///
/// Parallel connections between the same pair of nodes collapse into a
/// single edge. Connections naming unknown nodes are ignored.
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl DependencyGraph {
    pub fn build(workflow: &WorkflowGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node_id in workflow.nodes.keys() {
            let idx = graph.add_node(node_id.clone());
            index.insert(node_id.clone(), idx);
        }

        for conn in workflow.connections.values() {
            if let (Some(&from), Some(&to)) = (index.get(&conn.from_node), index.get(&conn.to_node)) {
                graph.update_edge(from, to, ());
            }
        }

        Self { graph, index }
    }

    pub fn graph(&self) -> &DiGraph<NodeId, ()> {
        &self.graph
    }

    /// Distinct upstream nodes of `node_id`.
    pub fn dependencies(&self, node_id: &str) -> BTreeSet<&NodeId> {
        self.index
            .get(node_id)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|dep| &self.graph[dep])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Kahn's algorithm, always releasing the lexicographically smallest ready node.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, WorkflowError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();

        let mut ready: BTreeSet<(&NodeId, NodeIndex)> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(&idx, _)| (&self.graph[idx], idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((node_id, idx)) = ready.pop_first() {
            order.push(node_id.clone());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((&self.graph[next], next));
                    }
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let mut stuck: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(idx, _)| self.graph[idx].clone())
                .collect();
            stuck.sort();
            return Err(WorkflowError::CyclicGraph { nodes: stuck });
        }

        Ok(order)
    }
}

/// Deterministic topological order of the workflow's nodes.
pub fn build_order(workflow: &WorkflowGraph) -> Result<Vec<NodeId>, WorkflowError> {
    DependencyGraph::build(workflow).execution_order()
}

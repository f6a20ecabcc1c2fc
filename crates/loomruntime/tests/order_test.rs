mod common;

use common::constant;
use loomcore::WorkflowGraph;
use loomruntime::build_order;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// A random DAG: edges only run forward along a shuffled ranking of the nodes.
fn random_dag(rng: &mut StdRng) -> WorkflowGraph {
    let count = rng.random_range(1..=16);
    let mut ids: Vec<String> = (0..count).map(|i| format!("node_{:02}", i)).collect();
    ids.shuffle(rng);

    let mut graph = WorkflowGraph::new();
    for id in &ids {
        graph.add_node(id.as_str(), constant(id));
    }
    for from in 0..count {
        for to in (from + 1)..count {
            if rng.random_bool(0.3) {
                graph.connect(ids[from].as_str(), "value", ids[to].as_str(), "value");
            }
        }
    }
    graph
}

#[test]
fn test_random_dags_order_sources_before_targets() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let graph = random_dag(&mut rng);
        let order = build_order(&graph).unwrap();

        assert_eq!(order.len(), graph.nodes.len());
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        assert_eq!(position.len(), graph.nodes.len(), "duplicate node in {:?}", order);

        for connection in graph.connections.values() {
            assert!(
                position[connection.from_node.as_str()] < position[connection.to_node.as_str()],
                "{} must run before {} in {:?}",
                connection.from_node,
                connection.to_node,
                order
            );
        }

        for _ in 0..3 {
            assert_eq!(build_order(&graph.clone()).unwrap(), order);
        }
    }
}

#[test]
fn test_ready_nodes_taken_in_id_order() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let graph = random_dag(&mut rng);
        let order = build_order(&graph).unwrap();
        let first = graph
            .nodes
            .keys()
            .find(|id| graph.incoming(id).next().is_none())
            .cloned();
        assert_eq!(order.first().cloned(), first);
    }
}

use crate::{PinSpec, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = String;
pub type ConnectionId = String;
pub type Properties = BTreeMap<String, Value>;

/// The executable part of a workflow: nodes and the connections between them.
///
/// Both maps are ordered so that iteration, and everything derived from it,
/// is reproducible for an identical graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeData>,
    #[serde(default)]
    pub connections: BTreeMap<ConnectionId, Connection>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, node: NodeData) -> NodeId {
        let id = id.into();
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Add a connection with a generated id of the form `c<n>`.
    pub fn connect(
        &mut self,
        from_node: impl Into<NodeId>,
        from_pin: impl Into<String>,
        to_node: impl Into<NodeId>,
        to_pin: impl Into<String>,
    ) -> ConnectionId {
        let mut n = self.connections.len() + 1;
        while self.connections.contains_key(&format!("c{}", n)) {
            n += 1;
        }
        let id = format!("c{}", n);
        self.connections.insert(
            id.clone(),
            Connection::new(from_node, from_pin, to_node, to_pin),
        );
        id
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    /// Connections whose destination is `node_id`, in connection id order.
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| c.to_node == node_id)
    }
}

/// A node as stored in the workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub inputs: Vec<PinSpec>,
    #[serde(default)]
    pub outputs: Vec<PinSpec>,
}

impl NodeData {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            position: Some(Position::default()),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn with_input(mut self, pin: PinSpec) -> Self {
        self.inputs.push(pin);
        self
    }

    pub fn with_output(mut self, pin: PinSpec) -> Self {
        self.outputs.push(pin);
        self
    }

    /// Whether a failure of this node aborts the whole run.
    ///
    /// Only a boolean `true` in the `critical` property counts; truthy
    /// values such as `1` or `"yes"` leave the node non-critical.
    pub fn is_critical(&self) -> bool {
        self.properties
            .get("critical")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.node_type)
    }
}

/// Connection from one node's output pin to another node's input pin.
///
/// Fields default to empty so that incomplete documents still load and the
/// validator can report exactly what is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub from_node: NodeId,
    #[serde(default)]
    pub from_pin: String,
    #[serde(default)]
    pub to_node: NodeId,
    #[serde(default)]
    pub to_pin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Connection {
    pub fn new(
        from_node: impl Into<NodeId>,
        from_pin: impl Into<String>,
        to_node: impl Into<NodeId>,
        to_pin: impl Into<String>,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_pin: from_pin.into(),
            to_node: to_node.into(),
            to_pin: to_pin.into(),
            metadata: None,
        }
    }
}

/// Node position in the visual editor. Opaque to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

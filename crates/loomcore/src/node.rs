use crate::{EventEmitter, ExecutionContext, NodeError, NodeId, NodeSchema, Properties, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Class-level description of the node type (pins, properties, category).
    fn schema() -> NodeSchema
    where
        Self: Sized;

    /// Execute the node with given context
    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone, Debug)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Input values gathered from incoming connections and pin defaults
    pub inputs: HashMap<String, Value>,

    /// Schema defaults overlaid with the node's own properties
    pub properties: Properties,

    /// Run-wide data store and variables
    pub context: Arc<ExecutionContext>,

    /// Log channel attributed to this node
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(node_id: impl Into<NodeId>, context: Arc<ExecutionContext>, events: EventEmitter) -> Self {
        let node_id = node_id.into();
        Self {
            events: events.for_node(node_id.clone()),
            node_id,
            inputs: HashMap::new(),
            properties: Properties::new(),
            context,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Get input, treating an explicit null as absent
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).filter(|v| !v.is_null())
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.input(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn input_or(&self, name: &str, default: Value) -> Value {
        self.input(name).cloned().unwrap_or(default)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    pub fn property_str(&self, name: &str, default: &str) -> String {
        match self.property(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => default.to_string(),
        }
    }

    /// Numeric property; numeric strings are accepted.
    pub fn property_f64(&self, name: &str, default: f64) -> f64 {
        self.property(name)
            .and_then(Value::coerce_f64)
            .unwrap_or(default)
    }

    pub fn property_bool(&self, name: &str, default: bool) -> bool {
        self.property(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Get property or return a configuration error
    pub fn require_property(&self, name: &str) -> Result<&Value, NodeError> {
        self.property(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing property: {}", name)))
    }
}

/// Output from node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output pin values
    pub outputs: HashMap<String, Value>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, pin: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(pin.into(), value.into());
        self
    }
}

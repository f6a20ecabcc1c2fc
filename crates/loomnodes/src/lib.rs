//! Standard node library
//!
//! Collection of built-in nodes: inputs, processing steps and outputs.

mod email;
mod http;
mod input;
mod output;
mod script;
mod time;
mod transform;

pub use email::EmailNode;
pub use http::{sign_payload, ApiInputNode, ApiOutputNode, WebhookNode};
pub use input::{
    EnvVarNode, FileInputNode, JsonInputNode, NumberInputNode, TextInputNode, VariableInputNode,
};
pub use output::{
    FileOutputNode, LogOutputNode, NotificationNode, TextOutputNode, VariableOutputNode,
};
pub use script::ScriptNode;
pub use time::{DelayNode, TimerNode};
pub use transform::{
    AggregateNode, ConditionalNode, FilterNode, MathNode, TextProcessorNode, TransformNode,
};

use loomruntime::NodeRegistry;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    // Input
    registry.register_node::<TextInputNode>();
    registry.register_node::<NumberInputNode>();
    registry.register_node::<JsonInputNode>();
    registry.register_node::<FileInputNode>();
    registry.register_node::<ApiInputNode>();
    registry.register_node::<TimerNode>();
    registry.register_node::<EnvVarNode>();
    registry.register_node::<VariableInputNode>();

    // Processing
    registry.register_node::<TextProcessorNode>();
    registry.register_node::<MathNode>();
    registry.register_node::<FilterNode>();
    registry.register_node::<TransformNode>();
    registry.register_node::<ConditionalNode>();
    registry.register_node::<DelayNode>();
    registry.register_node::<ScriptNode>();
    registry.register_node::<AggregateNode>();

    // Output
    registry.register_node::<TextOutputNode>();
    registry.register_node::<FileOutputNode>();
    registry.register_node::<ApiOutputNode>();
    registry.register_node::<EmailNode>();
    registry.register_node::<NotificationNode>();
    registry.register_node::<LogOutputNode>();
    registry.register_node::<WebhookNode>();
    registry.register_node::<VariableOutputNode>();
}

/// A registry holding every standard node.
pub fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}

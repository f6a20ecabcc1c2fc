#![allow(dead_code)]

use async_trait::async_trait;
use loomcore::{
    EventReceiver, ExecutionEvent, Node, NodeContext, NodeData, NodeError, NodeOutput, NodeSchema,
    Value,
};
use loomruntime::NodeRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Emits its `value` property on the `value` pin.
#[derive(Default)]
pub struct Constant;

#[async_trait]
impl Node for Constant {
    fn schema() -> NodeSchema {
        NodeSchema::new("constant", "Constant", "Emits a fixed value", "Input")
            .output("value", "string", "The value")
            .property("value", "string", "Value", "Value to emit", "", false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_output("value", ctx.property_str("value", "")))
    }
}

/// Joins its two optional inputs.
#[derive(Default)]
pub struct Concat;

#[async_trait]
impl Node for Concat {
    fn schema() -> NodeSchema {
        NodeSchema::new("concat", "Concat", "Joins a and b", "Processing")
            .input_with_default("a", "string", "First part", "")
            .input_with_default("b", "string", "Second part", "")
            .output("value", "string", "a followed by b")
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let a = ctx.input_or("a", Value::Null).to_string();
        let b = ctx.input_or("b", Value::Null).to_string();
        Ok(NodeOutput::new().with_output("value", format!("{}{}", a, b)))
    }
}

/// Requires its input, then copies it.
#[derive(Default)]
pub struct Strict;

#[async_trait]
impl Node for Strict {
    fn schema() -> NodeSchema {
        NodeSchema::new("strict", "Strict", "Needs its input", "Processing")
            .input("value", "any", "Required value", true)
            .output("value", "any", "Copied value")
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let value = ctx.require_input("value")?.clone();
        Ok(NodeOutput::new().with_output("value", value))
    }
}

#[derive(Default)]
pub struct Fail;

#[async_trait]
impl Node for Fail {
    fn schema() -> NodeSchema {
        NodeSchema::new("fail", "Fail", "Always fails", "Processing")
            .input("value", "any", "Ignored", false)
            .output("value", "any", "Never produced")
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

#[derive(Default)]
pub struct Explode;

#[async_trait]
impl Node for Explode {
    fn schema() -> NodeSchema {
        NodeSchema::new("explode", "Explode", "Panics", "Processing")
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        panic!("node blew up");
    }
}

/// Sleeps for `ms` milliseconds, then passes its input through.
#[derive(Default)]
pub struct Sleep;

#[async_trait]
impl Node for Sleep {
    fn schema() -> NodeSchema {
        NodeSchema::new("sleep", "Sleep", "Waits", "Processing")
            .input("value", "any", "Passed through", false)
            .output("value", "any", "Input value")
            .property("ms", "number", "Milliseconds", "How long to wait", 10.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let ms = ctx.property_f64("ms", 10.0) as u64;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(NodeOutput::new().with_output("value", ctx.input_or("value", Value::Null)))
    }
}

pub fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    registry.register_node::<Constant>();
    registry.register_node::<Concat>();
    registry.register_node::<Strict>();
    registry.register_node::<Fail>();
    registry.register_node::<Explode>();
    registry.register_node::<Sleep>();
    Arc::new(registry)
}

pub fn constant(value: &str) -> NodeData {
    NodeData::new("constant").with_property("value", value)
}

pub fn sleep(ms: f64) -> NodeData {
    NodeData::new("sleep").with_property("ms", ms)
}

/// Drain events until the run's completion event arrives.
pub async fn collect_until_completed(rx: &mut EventReceiver) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = matches!(event, ExecutionEvent::Completed { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

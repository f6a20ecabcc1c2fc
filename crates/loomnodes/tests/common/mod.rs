#![allow(dead_code)]

use loomcore::{
    EventEmitter, EventReceiver, ExecutionContext, ExecutionEvent, ExecutionId, NodeData,
    NodeError, NodeOutput, Value,
};
use loomruntime::NodeRegistry;
use std::collections::HashMap;
use std::sync::Arc;

pub fn registry() -> Arc<NodeRegistry> {
    Arc::new(loomnodes::standard_registry())
}

pub fn context() -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::new(ExecutionId::new_v4()))
}

/// Run one node through its registry instance, so schema defaults apply.
pub async fn run_in(
    context: &Arc<ExecutionContext>,
    events: &EventEmitter,
    data: NodeData,
    inputs: &[(&str, Value)],
) -> Result<NodeOutput, NodeError> {
    let instance = registry()
        .create_instance(&data.node_type.clone(), "node", &data)
        .map_err(|e| NodeError::Configuration(e.to_string()))?;
    let inputs: HashMap<String, Value> = inputs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    instance.execute(inputs, Arc::clone(context), events).await
}

pub async fn run(data: NodeData, inputs: &[(&str, Value)]) -> Result<NodeOutput, NodeError> {
    let context = context();
    let events = EventEmitter::detached(context.execution_id());
    run_in(&context, &events, data, inputs).await
}

pub fn json(value: serde_json::Value) -> Value {
    Value::from(value)
}

pub fn out<'a>(output: &'a NodeOutput, pin: &str) -> &'a Value {
    output
        .outputs
        .get(pin)
        .unwrap_or_else(|| panic!("missing output pin {}", pin))
}

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

/// Drain whatever is already queued without waiting.
pub fn drain(rx: &mut EventReceiver) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

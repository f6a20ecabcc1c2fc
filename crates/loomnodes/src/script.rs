//! Sandboxed JavaScript node.
//!
//! The snippet runs inside a fresh boa context with `data` (the input) and
//! `variables` (a snapshot of the run's variables) in scope. Whatever the
//! snippet leaves in `result` becomes the `result` output, and every
//! `console.log` line is collected into `output`.
//!
//! The timeout is enforced inside the interpreter: loop iterations are
//! capped in proportion to it, and the recursion depth is fixed. A runaway
//! script therefore ends on its own and never outlives the node.

use async_trait::async_trait;
use boa_engine::{Context, Source};
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Interpreted loop iterations allowed per second of timeout.
const LOOP_ITERATIONS_PER_SECOND: f64 = 1_000_000.0;
const MIN_LOOP_ITERATIONS: u64 = 10_000;
const RECURSION_LIMIT: usize = 256;

const CONSOLE_SHIM: &str = r#"
var __console_logs = [];
var console = {
    log: function() {
        var args = [];
        for (var i = 0; i < arguments.length; i++) {
            if (typeof arguments[i] === 'object') {
                args.push(JSON.stringify(arguments[i]));
            } else {
                args.push(String(arguments[i]));
            }
        }
        __console_logs.push(args.join(' '));
    },
    warn: function() { console.log.apply(null, arguments); },
    error: function() { console.log.apply(null, arguments); },
    info: function() { console.log.apply(null, arguments); }
};
"#;

#[derive(Default)]
pub struct ScriptNode;

#[async_trait]
impl Node for ScriptNode {
    fn schema() -> NodeSchema {
        NodeSchema::new(
            "script",
            "JavaScript",
            "Executes a custom JavaScript snippet",
            "Processing",
        )
        .with_icon("📜")
        .input("data", "any", "Input data", false)
        .output("result", "any", "Script output")
        .output("output", "string", "Console output")
        .property(
            "script",
            "text",
            "Script",
            "JavaScript code to execute; assign to `result`",
            "// Process data\nresult = data;",
            true,
        )
        .property("timeout", "number", "Timeout", "Script timeout in seconds", 10.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let script = ctx.property_str("script", "result = data;");
        let timeout = crate::time::seconds("timeout", ctx.property_f64("timeout", 10.0).max(0.0))?;
        let data = ctx.input_or("data", Value::Null);
        let variables: BTreeMap<String, Value> = ctx.context.variables().into_iter().collect();

        let program = wrap(&script, &data, &Value::Object(variables));
        let run = tokio::task::spawn_blocking(move || run_script(&program, timeout))
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Script task failed: {}", e)))??;

        for line in &run.logs {
            ctx.events.debug(format!("console: {}", line));
        }
        Ok(NodeOutput::new()
            .with_output("result", run.result)
            .with_output("output", run.logs.join("\n")))
    }
}

struct ScriptRun {
    result: Value,
    logs: Vec<String>,
}

fn wrap(script: &str, data: &Value, variables: &Value) -> String {
    format!(
        r#"
{console}
(function() {{
    var data = {data};
    var variables = {variables};
    var result = data;

{script}

    return JSON.stringify({{
        "__output": result === undefined ? null : result,
        "__console_logs": __console_logs
    }});
}})();
"#,
        console = CONSOLE_SHIM,
        data = data.to_json(),
        variables = variables.to_json(),
        script = script,
    )
}

fn run_script(program: &str, timeout: Duration) -> Result<ScriptRun, NodeError> {
    let started = Instant::now();
    let mut context = Context::default();
    let limits = context.runtime_limits_mut();
    limits.set_loop_iteration_limit(loop_budget(timeout));
    limits.set_recursion_limit(RECURSION_LIMIT);

    let value = context.eval(Source::from_bytes(program)).map_err(|e| {
        let hit_limit = e.as_native().is_some_and(|n| n.is_runtime_limit());
        if hit_limit && started.elapsed() >= timeout {
            timed_out(timeout)
        } else {
            NodeError::ExecutionFailed(format!("Script execution error: {}", e))
        }
    })?;
    if started.elapsed() > timeout {
        return Err(timed_out(timeout));
    }

    let text = value
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| NodeError::ExecutionFailed("Script produced no result".to_string()))?;
    let wrapper: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| NodeError::ExecutionFailed(format!("Failed to parse script result: {}", e)))?;

    let logs = wrapper
        .get("__console_logs")
        .and_then(|v| v.as_array())
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let result = wrapper
        .get("__output")
        .cloned()
        .map(Value::from)
        .unwrap_or(Value::Null);
    Ok(ScriptRun { result, logs })
}

fn loop_budget(timeout: Duration) -> u64 {
    let budget = timeout.as_secs_f64() * LOOP_ITERATIONS_PER_SECOND;
    if budget >= u64::MAX as f64 {
        return u64::MAX - 1;
    }
    (budget as u64).max(MIN_LOOP_ITERATIONS)
}

fn timed_out(timeout: Duration) -> NodeError {
    NodeError::ExecutionFailed(format!(
        "Script timed out after {:.1}s",
        timeout.as_secs_f64()
    ))
}

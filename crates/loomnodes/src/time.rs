use async_trait::async_trait;
use chrono::Utc;
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use rand::Rng;
use std::time::Instant;
use std::time::Duration;
use tokio::time::sleep;

/// Seconds from a node property; infinite or out-of-range values are a configuration error.
pub(crate) fn seconds(name: &str, secs: f64) -> Result<Duration, NodeError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        NodeError::Configuration(format!("Invalid {}: {} seconds", name, secs))
    })
}

/// Delay execution, passing `data` through unchanged
#[derive(Default)]
pub struct DelayNode;

#[async_trait]
impl Node for DelayNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("delay", "Delay", "Adds a delay in workflow execution", "Processing")
            .with_icon("⏳")
            .input("data", "any", "Data to pass through", false)
            .output("data", "any", "Same data after delay")
            .output("delay_time", "number", "Actual delay time in seconds")
            .property("delay_seconds", "number", "Delay (seconds)", "Number of seconds to delay", 1.0, true)
            .select("delay_type", "Delay Type", "Type of delay", "fixed", &["fixed", "random"])
            .property("max_delay", "number", "Max Delay", "Maximum delay for random type", 5.0, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let delay_seconds = ctx.property_f64("delay_seconds", 1.0).max(0.0);
        let max_delay = ctx.property_f64("max_delay", 5.0).max(0.0);
        seconds("delay_seconds", delay_seconds)?;
        seconds("max_delay", max_delay)?;

        let target = match ctx.property_str("delay_type", "fixed").as_str() {
            "random" if delay_seconds < max_delay => {
                rand::rng().random_range(delay_seconds..=max_delay)
            }
            _ => delay_seconds,
        };

        ctx.events.info(format!("Delaying for {:.3}s", target));
        let started = Instant::now();
        sleep(seconds("delay", target)?).await;

        Ok(NodeOutput::new()
            .with_output("data", ctx.input_or("data", Value::Null))
            .with_output("delay_time", started.elapsed().as_secs_f64()))
    }
}

/// Emits a timestamp and a run-scoped tick counter
#[derive(Default)]
pub struct TimerNode;

#[async_trait]
impl Node for TimerNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("timer", "Timer", "Generates periodic triggers", "Input")
            .with_icon("⏰")
            .output("timestamp", "string", "Current timestamp")
            .output("tick_count", "number", "Number of ticks elapsed")
            .property("interval", "number", "Interval", "Interval in seconds", 1.0, true)
            .property(
                "max_ticks",
                "number",
                "Max Ticks",
                "Maximum number of ticks (0 = unlimited)",
                0.0,
                false,
            )
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let interval = seconds("interval", ctx.property_f64("interval", 1.0).max(0.0))?;
        let max_ticks = ctx.property_f64("max_ticks", 0.0);

        let key = format!("timer_{}_ticks", ctx.node_id);
        let ticks = ctx
            .context
            .get_data(&key)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        if max_ticks > 0.0 && ticks >= max_ticks {
            return Err(NodeError::ExecutionFailed(
                "Timer has reached maximum ticks".to_string(),
            ));
        }
        // First tick fires immediately
        if ticks > 0.0 {
            sleep(interval).await;
        }

        let ticks = ticks + 1.0;
        ctx.context.set_data(key, ticks);
        Ok(NodeOutput::new()
            .with_output("timestamp", Utc::now().to_rfc3339())
            .with_output("tick_count", ticks))
    }
}

use crate::{ExecutionId, NodeId, NodeStatus, RunReport, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        })
    }
}

/// Events emitted while a workflow runs.
///
/// All events of one run go through a single channel, so a subscriber sees
/// them in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    Log {
        execution_id: ExecutionId,
        level: LogLevel,
        message: String,
        node_id: Option<NodeId>,
        details: Option<Value>,
        timestamp: DateTime<Utc>,
    },
    NodeStatus {
        execution_id: ExecutionId,
        node_id: NodeId,
        status: NodeStatus,
    },
    Completed {
        execution_id: ExecutionId,
        success: bool,
        message: String,
        report: Option<Box<RunReport>>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::Log { execution_id, .. }
            | ExecutionEvent::NodeStatus { execution_id, .. }
            | ExecutionEvent::Completed { execution_id, .. } => *execution_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ExecutionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a subscriber channel for one or more runs.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Event emitter handed to the executor and to nodes.
///
/// Every event is mirrored to `tracing`. Delivery to the subscriber is
/// best effort: a dropped receiver never fails the run.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: Option<NodeId>,
    sender: Option<EventSender>,
}

impl EventEmitter {
    pub fn new(execution_id: ExecutionId, sender: Option<EventSender>) -> Self {
        Self {
            execution_id,
            node_id: None,
            sender,
        }
    }

    /// Emitter that only logs through `tracing`.
    pub fn detached(execution_id: ExecutionId) -> Self {
        Self::new(execution_id, None)
    }

    /// Same channel, with log lines attributed to `node_id`.
    pub fn for_node(&self, node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..self.clone()
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    fn send(&self, event: ExecutionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with_details(level, message, None);
    }

    pub fn log_with_details(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let message = message.into();
        let node = self.node_id.as_deref().unwrap_or("-");
        match level {
            LogLevel::Debug => {
                tracing::debug!(execution_id = %self.execution_id, node, "{}", message)
            }
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(execution_id = %self.execution_id, node, "{}", message)
            }
            LogLevel::Warning => {
                tracing::warn!(execution_id = %self.execution_id, node, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(execution_id = %self.execution_id, node, "{}", message)
            }
        }

        self.send(ExecutionEvent::Log {
            execution_id: self.execution_id,
            level,
            message,
            node_id: self.node_id.clone(),
            details,
            timestamp: Utc::now(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub fn node_status(&self, node_id: impl Into<NodeId>, status: NodeStatus) {
        self.send(ExecutionEvent::NodeStatus {
            execution_id: self.execution_id,
            node_id: node_id.into(),
            status,
        });
    }

    pub fn completed(&self, success: bool, message: impl Into<String>, report: Option<RunReport>) {
        self.send(ExecutionEvent::Completed {
            execution_id: self.execution_id,
            success,
            message: message.into(),
            report: report.map(Box::new),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_keep_emission_order() {
        let (tx, mut rx) = channel();
        let emitter = EventEmitter::new(ExecutionId::new_v4(), Some(tx));
        emitter.info("first");
        emitter.for_node("n1").node_status("n1", NodeStatus::Running);
        emitter.for_node("n1").success("second");

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        assert!(matches!(&seen[0], ExecutionEvent::Log { message, node_id: None, .. } if message == "first"));
        assert!(matches!(&seen[1], ExecutionEvent::NodeStatus { status: NodeStatus::Running, .. }));
        assert!(matches!(
            &seen[2],
            ExecutionEvent::Log { level: LogLevel::Success, node_id: Some(n), .. } if n == "n1"
        ));
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        let emitter = EventEmitter::new(ExecutionId::new_v4(), Some(tx));
        emitter.error("nobody listening");
        emitter.completed(false, "done", None);
    }
}

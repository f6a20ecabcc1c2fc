//! Core abstractions for the loom workflow engine
//!
//! This crate provides the data model, the node contract, events and the
//! error taxonomy that the runtime and the node catalog build on.

mod context;
pub mod document;
mod error;
pub mod events;
mod node;
pub mod pin;
mod run;
mod schema;
mod value;
mod workflow;

pub use context::ExecutionContext;
pub use document::{DocumentMetadata, SummaryNode, WorkflowDocument, WorkflowSummary};
pub use error::{
    FlowError, IssueKind, NodeError, Severity, ValidationIssue, WorkflowError,
};
pub use events::{EventEmitter, EventReceiver, EventSender, ExecutionEvent, LogLevel};
pub use node::{Node, NodeContext, NodeOutput};
pub use run::{ExecutionStatus, NodeStatus, RunReport, RunStatus};
pub use schema::{NodeSchema, PinSpec, PropertySpec};
pub use value::Value;
pub use workflow::{Connection, ConnectionId, NodeData, NodeId, Position, Properties, WorkflowGraph};

pub type ExecutionId = uuid::Uuid;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

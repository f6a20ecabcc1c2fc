//! Workflow execution runtime
//!
//! This crate provides the engine that validates and runs workflows, the
//! node registry, and the dependency ordering used by the executor.

mod engine;
mod executor;
mod order;
mod registry;
mod validator;

pub use engine::{EngineConfig, EngineStats, WorkflowEngine};
pub use executor::{RunHandle, WorkflowExecution};
pub use order::{build_order, DependencyGraph};
pub use registry::{NodeFactory, NodeInstance, NodeRegistry, TypedFactory};
pub use validator::GraphValidator;

use crate::executor::{panic_message, RunHandle, WorkflowExecution};
use crate::registry::NodeRegistry;
use crate::validator::GraphValidator;
use futures::FutureExt;
use loomcore::{
    EventEmitter, EventSender, ExecutionId, ExecutionStatus, RunReport, RunStatus,
    ValidationIssue, WorkflowGraph,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Runs allowed to execute at the same time; further runs queue.
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub max_workers: usize,
    pub available_workers: usize,
    pub active_executions: usize,
    pub total_submitted: u64,
    pub registered_node_types: usize,
    pub accepting: bool,
}

type ActiveRuns = Arc<Mutex<HashMap<ExecutionId, Arc<RunHandle>>>>;

/// Accepts workflow submissions and runs them on a bounded pool of workers.
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    validator: GraphValidator,
    config: EngineConfig,
    permits: Arc<Semaphore>,
    active: ActiveRuns,
    tracker: TaskTracker,
    accepting: AtomicBool,
    submitted: AtomicU64,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        let workers = config.max_workers.max(1);
        tracing::info!(
            "Workflow engine ready: {} workers, {} node types",
            workers,
            registry.list_node_types().len()
        );
        Self {
            validator: GraphValidator::new(Arc::clone(&registry)),
            registry,
            config: EngineConfig { max_workers: workers },
            permits: Arc::new(Semaphore::new(workers)),
            active: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
            accepting: AtomicBool::new(true),
            submitted: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validate_workflow(&self, graph: &WorkflowGraph) -> Vec<ValidationIssue> {
        self.validator.validate(graph)
    }

    /// Submit a snapshot of `graph` for execution and return its id at once.
    ///
    /// Every outcome, including refusal, is reported through `events`; this
    /// call never fails.
    pub fn execute_workflow(&self, graph: &WorkflowGraph, events: Option<EventSender>) -> ExecutionId {
        let execution_id = ExecutionId::new_v4();
        let emitter = EventEmitter::new(execution_id, events);
        self.submitted.fetch_add(1, Ordering::Relaxed);

        if !self.accepting.load(Ordering::SeqCst) {
            let message = "Engine is shutting down, execution rejected";
            emitter.error(message);
            emitter.completed(false, message, None);
            return execution_id;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            let message = "No async runtime available, execution rejected";
            emitter.error(message);
            emitter.completed(false, message, None);
            return execution_id;
        }

        let handle = Arc::new(RunHandle::new(execution_id, emitter));
        self.active.lock().insert(execution_id, Arc::clone(&handle));
        tracing::info!(%execution_id, nodes = graph.nodes.len(), "Workflow submitted");

        let task = RunTask {
            graph: Arc::new(graph.clone()),
            registry: Arc::clone(&self.registry),
            validator: self.validator.clone(),
            permits: Arc::clone(&self.permits),
            handle,
            guard: ActiveEntry {
                active: Arc::clone(&self.active),
                execution_id,
            },
        };
        self.tracker.spawn(task.run());
        execution_id
    }

    /// Stop one run, or every active run when `execution_id` is `None`.
    /// Returns whether any run was signalled.
    pub fn stop_execution(&self, execution_id: Option<ExecutionId>) -> bool {
        let handles: Vec<Arc<RunHandle>> = {
            let active = self.active.lock();
            match execution_id {
                Some(id) => active.get(&id).cloned().into_iter().collect(),
                None => active.values().cloned().collect(),
            }
        };
        for handle in &handles {
            handle.stop();
        }
        !handles.is_empty()
    }

    /// Refuse new work, stop every run and wait until all of them have ended.
    pub async fn stop_all_executions(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let signalled = self.stop_execution(None);
        tracing::info!(signalled, "Stopping all executions");
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub fn get_execution_status(&self, execution_id: ExecutionId) -> Option<ExecutionStatus> {
        self.active.lock().get(&execution_id).map(|h| h.status())
    }

    pub fn get_all_execution_statuses(&self) -> Vec<ExecutionStatus> {
        let mut statuses: Vec<ExecutionStatus> =
            self.active.lock().values().map(|h| h.status()).collect();
        statuses.sort_by_key(|s| (s.start_time, s.execution_id));
        statuses
    }

    pub fn is_execution_running(&self, execution_id: ExecutionId) -> bool {
        self.active.lock().contains_key(&execution_id)
    }

    pub fn has_active_executions(&self) -> bool {
        !self.active.lock().is_empty()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            max_workers: self.config.max_workers,
            available_workers: self.permits.available_permits(),
            active_executions: self.active.lock().len(),
            total_submitted: self.submitted.load(Ordering::Relaxed),
            registered_node_types: self.registry.list_node_types().len(),
            accepting: self.accepting.load(Ordering::SeqCst),
        }
    }
}

/// Removes a run from the active table when dropped, including on unwind.
struct ActiveEntry {
    active: ActiveRuns,
    execution_id: ExecutionId,
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        self.active.lock().remove(&self.execution_id);
    }
}

struct RunTask {
    graph: Arc<WorkflowGraph>,
    registry: Arc<NodeRegistry>,
    validator: GraphValidator,
    permits: Arc<Semaphore>,
    handle: Arc<RunHandle>,
    guard: ActiveEntry,
}

struct Outcome {
    success: bool,
    message: String,
    report: Option<RunReport>,
}

impl RunTask {
    async fn run(self) {
        let RunTask {
            graph,
            registry,
            validator,
            permits,
            handle,
            guard,
        } = self;

        let outcome = Self::drive(graph, registry, validator, permits, &handle).await;
        drop(guard);

        tracing::info!(
            execution_id = %handle.execution_id(),
            success = outcome.success,
            "{}",
            outcome.message
        );
        handle
            .events()
            .completed(outcome.success, outcome.message, outcome.report);
    }

    async fn drive(
        graph: Arc<WorkflowGraph>,
        registry: Arc<NodeRegistry>,
        validator: GraphValidator,
        permits: Arc<Semaphore>,
        handle: &Arc<RunHandle>,
    ) -> Outcome {
        let events = handle.events();

        let permit = tokio::select! {
            biased;
            _ = handle.cancellation_token().cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            handle.finish(RunStatus::Stopped, None);
            events.warn("Execution stopped before it started");
            return Outcome {
                success: false,
                message: "Workflow execution stopped".to_string(),
                report: None,
            };
        };

        match validator.ensure_valid(&graph) {
            Ok(warnings) => {
                for warning in warnings {
                    events.warn(warning.message);
                }
            }
            Err(e) => {
                let message = e.to_string();
                events.error(message.clone());
                handle.finish(RunStatus::Failed, Some(message.clone()));
                return Outcome {
                    success: false,
                    message,
                    report: None,
                };
            }
        }

        let execution = WorkflowExecution::new(graph, registry, Arc::clone(handle));
        match AssertUnwindSafe(execution.execute()).catch_unwind().await {
            Ok(report) => Outcome {
                success: report.status.is_success(),
                message: completion_message(&report),
                report: Some(report),
            },
            Err(payload) => {
                let message = format!(
                    "Workflow execution failed: {}",
                    panic_message(payload.as_ref())
                );
                events.error(message.clone());
                handle.finish(RunStatus::Failed, Some(message.clone()));
                Outcome {
                    success: false,
                    message,
                    report: None,
                }
            }
        }
    }
}

fn completion_message(report: &RunReport) -> String {
    match report.status {
        RunStatus::Completed => "Workflow completed successfully".to_string(),
        RunStatus::CompletedWithErrors => format!(
            "Workflow completed with {} failed node(s)",
            report.failed_nodes.len()
        ),
        RunStatus::Stopped => "Workflow execution stopped".to_string(),
        _ => match report.errors.last() {
            Some(error) => format!("Workflow execution failed: {}", error),
            None => "Workflow execution failed".to_string(),
        },
    }
}

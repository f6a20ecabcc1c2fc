use crate::order::build_order;
use crate::registry::NodeRegistry;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use loomcore::{
    EventEmitter, ExecutionContext, ExecutionId, ExecutionStatus, NodeData, NodeError, NodeId,
    NodeOutput, NodeStatus, RunReport, RunStatus, Value, WorkflowGraph,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared handle to one run: stop requests and status snapshots.
pub struct RunHandle {
    execution_id: ExecutionId,
    cancel: CancellationToken,
    events: EventEmitter,
    state: Mutex<RunState>,
}

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    current_node: Option<NodeId>,
    start_time: Option<DateTime<Utc>>,
    total_nodes: usize,
    finished_nodes: usize,
    errors: Vec<String>,
}

impl RunHandle {
    pub fn new(execution_id: ExecutionId, events: EventEmitter) -> Self {
        Self {
            execution_id,
            cancel: CancellationToken::new(),
            events,
            state: Mutex::new(RunState {
                status: RunStatus::Pending,
                current_node: None,
                start_time: None,
                total_nodes: 0,
                finished_nodes: 0,
                errors: Vec::new(),
            }),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request a cooperative stop. Takes effect at the next node boundary.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.status.is_terminal() || self.cancel.is_cancelled() {
                return;
            }
            state.status = RunStatus::Stopping;
        }
        self.cancel.cancel();
        self.events.warn("Stop requested");
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn run_status(&self) -> RunStatus {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        matches!(self.run_status(), RunStatus::Running | RunStatus::Stopping)
    }

    pub fn status(&self) -> ExecutionStatus {
        let state = self.state.lock();
        let progress = if state.total_nodes == 0 {
            0.0
        } else {
            state.finished_nodes as f64 / state.total_nodes as f64 * 100.0
        };
        ExecutionStatus {
            execution_id: self.execution_id,
            status: state.status,
            current_node: state.current_node.clone(),
            progress,
            start_time: state.start_time,
            errors: state.errors.clone(),
        }
    }

    fn begin(&self, total_nodes: usize) -> DateTime<Utc> {
        let mut state = self.state.lock();
        let now = Utc::now();
        state.start_time = Some(now);
        state.total_nodes = total_nodes;
        if state.status == RunStatus::Pending {
            state.status = RunStatus::Running;
        }
        now
    }

    fn enter_node(&self, node_id: &str) {
        self.state.lock().current_node = Some(node_id.to_string());
    }

    fn leave_node(&self, error: Option<String>) {
        let mut state = self.state.lock();
        state.current_node = None;
        state.finished_nodes += 1;
        state.errors.extend(error);
    }

    /// Record a terminal status and any run-level error.
    pub(crate) fn finish(&self, status: RunStatus, error: Option<String>) {
        let mut state = self.state.lock();
        state.status = status;
        state.current_node = None;
        state.errors.extend(error);
    }
}

/// One run of a workflow snapshot, executed sequentially in dependency order.
pub struct WorkflowExecution {
    graph: Arc<WorkflowGraph>,
    registry: Arc<NodeRegistry>,
    handle: Arc<RunHandle>,
    context: Arc<ExecutionContext>,
}

impl WorkflowExecution {
    pub fn new(graph: Arc<WorkflowGraph>, registry: Arc<NodeRegistry>, handle: Arc<RunHandle>) -> Self {
        let context = Arc::new(ExecutionContext::new(handle.execution_id()));
        Self {
            graph,
            registry,
            handle,
            context,
        }
    }

    pub fn handle(&self) -> &Arc<RunHandle> {
        &self.handle
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Run every node once and return the final report.
    pub async fn execute(self) -> RunReport {
        let events = self.handle.events().clone();
        let mut report = RunReport {
            execution_id: self.handle.execution_id(),
            status: RunStatus::Running,
            execution_order: Vec::new(),
            completed_nodes: BTreeSet::new(),
            failed_nodes: BTreeSet::new(),
            node_statuses: BTreeMap::new(),
            node_outputs: BTreeMap::new(),
            errors: Vec::new(),
            start_time: None,
            end_time: None,
        };

        let started = Instant::now();
        report.start_time = Some(self.handle.begin(self.graph.nodes.len()));
        events.info(format!(
            "Starting workflow execution ({} nodes)",
            self.graph.nodes.len()
        ));

        match build_order(&self.graph) {
            Ok(order) => report.execution_order = order,
            Err(e) => {
                events.error(e.to_string());
                return self.conclude(report, RunStatus::Failed, Some(e.to_string()));
            }
        }
        events.debug(format!("Execution order: {}", report.execution_order.join(" -> ")));

        let order = report.execution_order.clone();
        for node_id in &order {
            if self.handle.is_stop_requested() {
                events.warn("Execution stopped");
                return self.conclude(report, RunStatus::Stopped, None);
            }

            let Some(node) = self.graph.nodes.get(node_id) else {
                continue;
            };

            self.handle.enter_node(node_id);
            report.node_statuses.insert(node_id.clone(), NodeStatus::Running);
            events.node_status(node_id.clone(), NodeStatus::Running);
            let node_events = events.for_node(node_id.clone());
            node_events.info(format!("Executing {}", node.display_name()));

            let node_started = Instant::now();
            let result = self
                .run_node(node_id, node, &report.node_outputs, &node_events)
                .await;
            match result {
                Ok(output) => {
                    report.node_outputs.insert(node_id.clone(), output.outputs);
                    report.node_statuses.insert(node_id.clone(), NodeStatus::Success);
                    report.completed_nodes.insert(node_id.clone());
                    events.node_status(node_id.clone(), NodeStatus::Success);
                    node_events.success(format!(
                        "Node {} completed in {:.3}s",
                        node_id,
                        node_started.elapsed().as_secs_f64()
                    ));
                    self.handle.leave_node(None);
                }
                Err(e) => {
                    let message = format!("Node {} failed: {}", node_id, e);
                    report.node_statuses.insert(node_id.clone(), NodeStatus::Error);
                    report.failed_nodes.insert(node_id.clone());
                    report.errors.push(message.clone());
                    events.node_status(node_id.clone(), NodeStatus::Error);
                    node_events.error(message.clone());
                    node_events.log_with_details(
                        loomcore::LogLevel::Debug,
                        format!("{:?}", e),
                        Some(Value::from(node.node_type.as_str())),
                    );
                    self.handle.leave_node(Some(message));

                    if node.is_critical() {
                        let abort = format!("Critical node {} failed, aborting workflow", node_id);
                        events.error(abort.clone());
                        return self.conclude(report, RunStatus::Failed, Some(abort));
                    }
                }
            }
        }

        let status = if report.failed_nodes.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        events.info(format!(
            "Workflow finished: {} succeeded, {} failed in {:.3}s",
            report.completed_nodes.len(),
            report.failed_nodes.len(),
            started.elapsed().as_secs_f64()
        ));
        self.conclude(report, status, None)
    }

    async fn run_node(
        &self,
        node_id: &str,
        node: &NodeData,
        outputs: &BTreeMap<NodeId, HashMap<String, Value>>,
        events: &EventEmitter,
    ) -> Result<NodeOutput, NodeError> {
        let instance = self
            .registry
            .create_instance(&node.node_type, node_id, node)
            .map_err(|e| NodeError::Configuration(e.to_string()))?;

        let mut inputs = HashMap::new();
        for conn in self.graph.incoming(node_id) {
            let Some(value) = outputs
                .get(&conn.from_node)
                .and_then(|o| o.get(&conn.from_pin))
            else {
                continue;
            };
            tracing::debug!(
                "Routing {}.{} -> {}.{}",
                conn.from_node,
                conn.from_pin,
                conn.to_node,
                conn.to_pin
            );
            inputs.insert(conn.to_pin.clone(), value.clone());
        }

        let call = instance.execute(inputs, Arc::clone(&self.context), events);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(NodeError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn conclude(&self, mut report: RunReport, status: RunStatus, error: Option<String>) -> RunReport {
        report.status = status;
        report.end_time = Some(Utc::now());
        report.errors.extend(error.clone());
        self.handle.finish(status, error);
        report
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

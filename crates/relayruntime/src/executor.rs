use crate::registry::NodeRegistry;
use crate::state::{InputTracker, RunState};
use crate::validation::ValidatedGraph;
use chrono::Utc;
use relaycore::{
    Batch, CredentialStore, EventBus, ExecutionContext, ExecutionEvent, FlowError, Item, Node,
    NodeError, NodeId, NodeOutput, NodeRunData, OutputHistory, OutputSummary, RunError, RunId,
    RunMode, RunRecord, RunStatus, RunStore, StaticDataStore, WorkflowGraph,
};
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Everything one run needs, assembled by the engine after validation
pub struct RunRequest {
    pub run_id: RunId,
    pub graph: Arc<WorkflowGraph>,
    pub validated: ValidatedGraph,
    pub initial_items: Vec<Item>,
    pub triggered_by: String,
    pub mode: RunMode,
    pub state: Arc<Mutex<RunState>>,
    pub cancellation: CancellationToken,
}

/// Final outcome of a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub history: OutputHistory,
    pub execution_order: Vec<NodeId>,
    pub error: Option<RunError>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Rebuild the outcome of a finished run from its stored record
    pub fn from_record(record: &RunRecord) -> Result<Self, FlowError> {
        if !record.status.is_terminal() {
            return Err(FlowError::Execution(format!(
                "Run {} is {:?} but no longer tracked by this engine",
                record.run_id, record.status
            )));
        }
        Ok(Self {
            run_id: record.run_id,
            status: record.status,
            history: record.output_history()?.unwrap_or_default(),
            execution_order: record.execution_order(),
            error: record.error(),
            duration_ms: record.duration_ms().unwrap_or_default(),
        })
    }

    /// Number of times a node executed during the run
    pub fn runs_of(&self, node_id: &str) -> usize {
        self.history.get(node_id).map_or(0, Vec::len)
    }
}

/// A node waiting to execute with its aggregated input per port
struct WorkItem {
    node_id: NodeId,
    inputs: Vec<Batch>,
}

/// Drives a single run: worklist scheduling, node invocation, propagation
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    store: Arc<dyn RunStore>,
    credentials: Arc<dyn CredentialStore>,
    max_node_runs: usize,
    node_timeout: Option<Duration>,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        event_bus: Arc<EventBus>,
        store: Arc<dyn RunStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            registry,
            event_bus,
            store,
            credentials,
            max_node_runs: 10_000,
            node_timeout: None,
        }
    }

    pub fn with_max_node_runs(mut self, max_node_runs: usize) -> Self {
        self.max_node_runs = max_node_runs;
        self
    }

    pub fn with_node_timeout(mut self, node_timeout: Option<Duration>) -> Self {
        self.node_timeout = node_timeout;
        self
    }

    /// Execute the run to a terminal status and persist it
    pub async fn execute(&self, request: RunRequest) -> RunResult {
        let start_time = Instant::now();
        let run_id = request.run_id;

        {
            let mut state = request.state.lock().await;
            if !state.transition(RunStatus::Running) {
                tracing::info!("Run {} was stopped before it started", run_id);
                drop(state);
                return self.finish(&request, start_time).await;
            }
            if let Err(e) = self
                .store
                .update_status(run_id, RunStatus::Running, Map::new())
                .await
            {
                tracing::error!("Failed to persist running status for {}: {}", run_id, e);
            }
            self.event_bus.emit(ExecutionEvent::RunStarted {
                run_id,
                workflow_id: request.graph.id,
                mode: request.mode,
                timestamp: Utc::now(),
            });
        }

        tracing::info!(
            "Starting run {} of workflow {} ({} trigger(s))",
            run_id,
            request.graph.id,
            request.validated.triggers.len()
        );

        let mut worklist: VecDeque<WorkItem> = request
            .validated
            .triggers
            .iter()
            .map(|trigger| WorkItem {
                node_id: trigger.clone(),
                inputs: vec![request.initial_items.clone()],
            })
            .collect();
        let mut tracker = InputTracker::new();
        let static_data = StaticDataStore::new();

        while let Some(work) = worklist.pop_front() {
            let Some(node) = request.graph.find_node(&work.node_id) else {
                tracing::warn!("Skipping unknown node {} in run {}", work.node_id, run_id);
                continue;
            };
            let Some(registered) = self.registry.get(&node.node_type, node.type_version) else {
                tracing::warn!(
                    "Skipping node {}: type '{}' is not registered",
                    node.id,
                    node.node_type
                );
                continue;
            };

            {
                let mut state = request.state.lock().await;
                if state.status != RunStatus::Running {
                    tracing::debug!("Run {} is {:?}, halting scheduling", run_id, state.status);
                    break;
                }
                if state.node_runs() >= self.max_node_runs {
                    let message = format!(
                        "Run exceeded the limit of {} node executions",
                        self.max_node_runs
                    );
                    tracing::error!("{} (run {})", message, run_id);
                    state.fail(RunError {
                        node_id: Some(node.id.clone()),
                        node_name: Some(node.display_name().to_string()),
                        message,
                    });
                    break;
                }
                self.event_bus.emit(ExecutionEvent::NodeStarted {
                    run_id,
                    node_id: node.id.clone(),
                    node_name: node.display_name().to_string(),
                    timestamp: Utc::now(),
                });
            }

            tracing::info!("Executing node {} ({})", node.id, node.node_type);

            let parameters = registered.descriptor.resolve_parameters(&node.parameters);
            let ctx = ExecutionContext::new(
                run_id,
                Arc::new(node.clone()),
                parameters,
                work.inputs,
                self.event_bus.node_emitter(run_id, node.id.clone()),
            )
            .with_mode(request.mode)
            .with_credentials(request.triggered_by.clone(), self.credentials.clone())
            .with_static_data(static_data.clone())
            .with_cancellation(request.cancellation.clone());

            let started_at = Utc::now();
            let node_start = Instant::now();
            let result = self.invoke(registered.implementation.clone(), ctx).await;
            let duration_ms = node_start.elapsed().as_millis() as u64;

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!("Node {} failed: {}", node.id, message);

                    let mut state = request.state.lock().await;
                    self.event_bus.emit(ExecutionEvent::NodeFailed {
                        run_id,
                        node_id: node.id.clone(),
                        node_name: node.display_name().to_string(),
                        message: message.clone(),
                        timestamp: Utc::now(),
                    });
                    state.fail(RunError {
                        node_id: Some(node.id.clone()),
                        node_name: Some(node.display_name().to_string()),
                        message,
                    });
                    break;
                }
            };

            let output = normalize(output, registered.descriptor.outputs);
            tracing::info!("Node {} completed in {}ms", node.id, duration_ms);

            {
                let mut state = request.state.lock().await;
                state.record(
                    &node.id,
                    NodeRunData {
                        started_at,
                        duration_ms,
                        outputs: output.ports.clone(),
                    },
                );
                self.event_bus.emit(ExecutionEvent::NodeCompleted {
                    run_id,
                    node_id: node.id.clone(),
                    node_name: node.display_name().to_string(),
                    output_summary: OutputSummary {
                        items_per_port: output.item_counts(),
                    },
                    duration_ms,
                    timestamp: Utc::now(),
                });
                if state.status != RunStatus::Running {
                    break;
                }
            }

            let ready = self.propagate(&request, &node.id, &output, &mut tracker);
            // Depth-first: newly eligible nodes run before older work
            for item in ready.into_iter().rev() {
                worklist.push_front(item);
            }
        }

        self.finish(&request, start_time).await
    }

    /// Deliver each produced batch along its outbound connections and
    /// collect the targets whose readiness policy is now satisfied.
    fn propagate(
        &self,
        request: &RunRequest,
        source: &str,
        output: &NodeOutput,
        tracker: &mut InputTracker,
    ) -> Vec<WorkItem> {
        let mut ready = Vec::new();

        for (port, batch) in output.produced() {
            let targets = request.graph.connections.outgoing(source, port);
            if targets.is_empty() {
                tracing::debug!("Output {}[{}] has no connections", source, port);
                continue;
            }

            for target in targets {
                let Some(target_node) = request.graph.find_node(&target.node) else {
                    tracing::warn!(
                        "Connection {}[{}] points at missing node {}, skipping branch",
                        source,
                        port,
                        target.node
                    );
                    continue;
                };
                let Some(registered) = self
                    .registry
                    .get(&target_node.node_type, target_node.type_version)
                else {
                    tracing::warn!(
                        "Node {} has unregistered type '{}', skipping branch",
                        target_node.id,
                        target_node.node_type
                    );
                    continue;
                };

                tracker.deliver(&target.node, target.port, source, port, batch.clone());

                let policy = target_node
                    .readiness
                    .unwrap_or(registered.descriptor.readiness);
                let inbound = request.validated.inbound(&target.node);
                let input_count = registered.descriptor.inputs.max(1);

                match tracker.take_if_ready(&target.node, policy, &inbound, input_count) {
                    Some(inputs) => {
                        tracing::debug!("Node {} is ready ({:?})", target.node, policy);
                        ready.push(WorkItem {
                            node_id: target.node.clone(),
                            inputs,
                        });
                    }
                    None => {
                        tracing::debug!("Node {} waiting for more input", target.node);
                    }
                }
            }
        }

        ready
    }

    /// Run the node on its own task so a panic surfaces as a node error
    async fn invoke(
        &self,
        node: Arc<dyn Node>,
        ctx: ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut task = tokio::spawn(async move { node.execute(&ctx).await });

        let joined = match self.node_timeout {
            Some(limit) => match timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(NodeError::Timeout {
                        ms: limit.as_millis() as u64,
                    });
                }
            },
            None => task.await,
        };

        joined.map_err(|e| NodeError::Panicked(e.to_string()))?
    }

    /// Settle the terminal status, persist it with the run data and emit the end event
    async fn finish(&self, request: &RunRequest, start_time: Instant) -> RunResult {
        let run_id = request.run_id;
        let mut state = request.state.lock().await;

        if state.status == RunStatus::Running {
            state.transition(RunStatus::Completed);
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        if let Err(e) = self
            .store
            .update_status(run_id, state.status, state.final_metadata(duration_ms))
            .await
        {
            tracing::error!("Failed to persist final status for {}: {}", run_id, e);
        }

        let success = state.status == RunStatus::Completed;

        self.event_bus.emit(ExecutionEvent::RunFinished {
            run_id,
            success,
            outputs_by_node: state.history.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match &state.error {
            Some(error) => tracing::error!("Run {} failed: {}", run_id, error.message),
            None => tracing::info!(
                "Run {} finished as {:?} in {}ms",
                run_id,
                state.status,
                duration_ms
            ),
        }

        RunResult {
            run_id,
            status: state.status,
            history: state.history.clone(),
            execution_order: state.execution_order.clone(),
            error: state.error.clone(),
            duration_ms,
        }
    }
}

/// Pad or trim the node's output to the port count its descriptor declares
fn normalize(mut output: NodeOutput, outputs: usize) -> NodeOutput {
    if output.ports.len() > outputs {
        tracing::warn!(
            "Node produced {} output ports but declares {}, extra ports dropped",
            output.ports.len(),
            outputs
        );
    }
    output.ports.resize(outputs, None);
    output
}

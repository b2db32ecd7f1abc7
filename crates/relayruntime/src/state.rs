use crate::validation::Inbound;
use relaycore::{
    Batch, NodeId, NodeRunData, OutputHistory, ReadinessPolicy, RunError, RunId, RunStatus,
    WorkflowId, DURATION_KEY, ERROR_KEY, EXECUTION_ORDER_KEY, RUN_DATA_KEY,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// In-memory record of a single run
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub history: OutputHistory,
    pub execution_order: Vec<NodeId>,
    pub error: Option<RunError>,
}

impl RunState {
    pub fn new(run_id: RunId, workflow_id: WorkflowId) -> Self {
        Self {
            run_id,
            workflow_id,
            status: RunStatus::Pending,
            history: OutputHistory::new(),
            execution_order: Vec::new(),
            error: None,
        }
    }

    /// Move to `next` if the status machine allows it
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Mark the run failed unless it already reached a terminal status
    pub fn fail(&mut self, error: RunError) -> bool {
        if self.transition(RunStatus::Failed) {
            self.error = Some(error);
            true
        } else {
            false
        }
    }

    /// Append one execution to the node's history
    pub fn record(&mut self, node_id: &str, data: NodeRunData) {
        self.history.entry(node_id.to_string()).or_default().push(data);
        self.execution_order.push(node_id.to_string());
    }

    pub fn node_runs(&self) -> usize {
        self.execution_order.len()
    }

    /// Metadata merged into the run record when the run finishes
    pub fn final_metadata(&self, duration_ms: u64) -> Map<String, Value> {
        let mut metadata = Map::new();
        match serde_json::to_value(&self.history) {
            Ok(history) => {
                metadata.insert(RUN_DATA_KEY.to_string(), history);
            }
            Err(e) => tracing::error!("Failed to serialize run data for {}: {}", self.run_id, e),
        }
        metadata.insert(
            EXECUTION_ORDER_KEY.to_string(),
            Value::from(self.execution_order.clone()),
        );
        metadata.insert(DURATION_KEY.to_string(), Value::from(duration_ms));
        if let Some(error) = &self.error {
            if let Ok(error) = serde_json::to_value(error) {
                metadata.insert(ERROR_KEY.to_string(), error);
            }
        }
        metadata
    }
}

#[derive(Debug, Clone)]
struct SourceBatch {
    source: NodeId,
    source_port: usize,
    batch: Batch,
}

/// Tracks the most recent batch each source delivered to each target port,
/// and which inbound connections delivered since the target last ran.
#[derive(Debug, Default)]
pub struct InputTracker {
    received: HashMap<NodeId, BTreeMap<usize, Vec<SourceBatch>>>,
    fresh: HashMap<NodeId, BTreeSet<Inbound>>,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch arriving on `target[port]` from `source[source_port]`,
    /// replacing whatever that same source delivered before.
    pub fn deliver(
        &mut self,
        target: &str,
        port: usize,
        source: &str,
        source_port: usize,
        batch: Batch,
    ) {
        let sources = self
            .received
            .entry(target.to_string())
            .or_default()
            .entry(port)
            .or_default();

        match sources
            .iter_mut()
            .find(|s| s.source == source && s.source_port == source_port)
        {
            Some(existing) => existing.batch = batch,
            None => sources.push(SourceBatch {
                source: source.to_string(),
                source_port,
                batch,
            }),
        }

        self.fresh.entry(target.to_string()).or_default().insert(Inbound {
            source: source.to_string(),
            source_port,
            port,
        });
    }

    /// If the policy is satisfied, consume the fresh flags and return the
    /// aggregated input for ports `0..input_count`.
    pub fn take_if_ready(
        &mut self,
        target: &str,
        policy: ReadinessPolicy,
        inbound: &BTreeSet<Inbound>,
        input_count: usize,
    ) -> Option<Vec<Batch>> {
        let fresh = self.fresh.get(target).cloned().unwrap_or_default();
        if !policy.is_ready(inbound, &fresh) {
            return None;
        }
        self.fresh.remove(target);
        Some(self.aggregate(target, input_count))
    }

    /// Latest batch from every source, concatenated per port
    pub fn aggregate(&self, target: &str, input_count: usize) -> Vec<Batch> {
        let received = self.received.get(target);
        (0..input_count)
            .map(|port| {
                received
                    .and_then(|ports| ports.get(&port))
                    .map(|sources| {
                        sources
                            .iter()
                            .flat_map(|s| s.batch.iter().cloned())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

use crate::{Batch, NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type RunId = Uuid;

/// Metadata key holding the serialized output history of a finished run
pub const RUN_DATA_KEY: &str = "runData";
/// Metadata key holding the node execution order of a finished run
pub const EXECUTION_ORDER_KEY: &str = "executionOrder";
/// Metadata key holding the failure of a failed run
pub const ERROR_KEY: &str = "error";
/// Metadata key holding the wall-clock duration of a finished run
pub const DURATION_KEY: &str = "durationMs";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Status only moves forward: pending -> running -> terminal.
    /// A pending run may be cancelled before it starts.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Pending, RunStatus::Failed) => true,
            (RunStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// How a run was started
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Manual,
    Webhook,
    Cron,
    TriggerEvent,
}

/// One execution of one node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRunData {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Batch per output port, `None` where the port produced nothing
    pub outputs: Vec<Option<Batch>>,
}

impl NodeRunData {
    pub fn batch(&self, port: usize) -> Option<&Batch> {
        self.outputs.get(port).and_then(Option::as_ref)
    }
}

/// Append-only per-node execution history of a run
pub type OutputHistory = BTreeMap<NodeId, Vec<NodeRunData>>;

/// Failure recorded on a failed run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunError {
    pub node_id: Option<NodeId>,
    pub node_name: Option<String>,
    pub message: String,
}

/// Persisted record of a run, owned by a run store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    pub workflow_id: WorkflowId,
    pub mode: RunMode,
    pub status: RunStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(
        workflow_id: WorkflowId,
        mode: RunMode,
        status: RunStatus,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id,
            mode,
            status,
            metadata,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Output history stored by the engine when the run finished
    pub fn output_history(&self) -> Result<Option<OutputHistory>, serde_json::Error> {
        self.metadata
            .get(RUN_DATA_KEY)
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }

    pub fn execution_order(&self) -> Vec<NodeId> {
        self.metadata
            .get(EXECUTION_ORDER_KEY)
            .and_then(Value::as_array)
            .map(|order| {
                order
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.metadata.get(DURATION_KEY).and_then(Value::as_u64)
    }

    pub fn error(&self) -> Option<RunError> {
        self.metadata
            .get(ERROR_KEY)
            .and_then(|e| serde_json::from_value(e.clone()).ok())
    }
}

use crate::{NodeId, OutputHistory, RunId, RunMode, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Lifecycle events emitted while a run executes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: RunId,
        workflow_id: WorkflowId,
        mode: RunMode,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: NodeId,
        node_name: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: RunId,
        node_id: NodeId,
        node_name: String,
        output_summary: OutputSummary,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: RunId,
        node_id: NodeId,
        node_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        success: bool,
        outputs_by_node: OutputHistory,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RunStopped {
        run_id: RunId,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        run_id: RunId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            ExecutionEvent::RunStarted { run_id, .. }
            | ExecutionEvent::NodeStarted { run_id, .. }
            | ExecutionEvent::NodeCompleted { run_id, .. }
            | ExecutionEvent::NodeFailed { run_id, .. }
            | ExecutionEvent::RunFinished { run_id, .. }
            | ExecutionEvent::RunStopped { run_id, .. }
            | ExecutionEvent::NodeEvent { run_id, .. } => *run_id,
        }
    }
}

/// Item counts per output port of one node execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputSummary {
    pub items_per_port: Vec<usize>,
}

impl OutputSummary {
    pub fn total_items(&self) -> usize {
        self.items_per_port.iter().sum()
    }
}

/// Messages a node may publish while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Handle a node uses to report on itself while it runs. Messages go out on
/// the bus and are mirrored to the log under the run and node ids.
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(run_id = %self.run_id, node = %self.node_id, "{}", message);
        self.publish(NodeEvent::Info { message });
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = %self.run_id, node = %self.node_id, "{}", message);
        self.publish(NodeEvent::Warning { message });
    }

    /// `percent` is clamped to `0..=100`
    pub fn progress(&self, percent: f64, message: Option<String>) {
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        tracing::debug!(run_id = %self.run_id, node = %self.node_id, "{:.0}%", percent);
        self.publish(NodeEvent::Progress { percent, message });
    }

    fn publish(&self, event: NodeEvent) {
        // Nobody listening is fine
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            run_id: self.run_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }
}

/// In-process broadcast bus shared by every run of an engine
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// `capacity` is the number of events a slow subscriber may fall behind
    /// before it starts losing them; at least one
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Events of every run
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.sender.subscribe(), None)
    }

    /// Events of one run, ending after its `RunFinished`
    pub fn subscribe_run(&self, run_id: RunId) -> EventStream {
        EventStream::new(self.sender.subscribe(), Some(run_id))
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn node_emitter(&self, run_id: RunId, node_id: impl Into<NodeId>) -> EventEmitter {
        EventEmitter {
            run_id,
            node_id: node_id.into(),
            sender: self.sender.clone(),
        }
    }
}

/// Receiving end of the bus. A subscriber that lags loses the oldest events
/// and keeps going.
pub struct EventStream {
    receiver: broadcast::Receiver<ExecutionEvent>,
    run_id: Option<RunId>,
    finished: bool,
}

impl EventStream {
    fn new(receiver: broadcast::Receiver<ExecutionEvent>, run_id: Option<RunId>) -> Self {
        Self {
            receiver,
            run_id,
            finished: false,
        }
    }

    /// Wait for the next event. `None` once the bus is gone or the
    /// followed run has finished.
    pub async fn next(&mut self) -> Option<ExecutionEvent> {
        while !self.finished {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(event) = self.accept(event) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber fell behind, {} event(s) dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
        None
    }

    /// Events already buffered, without waiting
    pub fn drain(&mut self) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while !self.finished {
            match self.receiver.try_recv() {
                Ok(event) => events.extend(self.accept(event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber fell behind, {} event(s) dropped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        events
    }

    fn accept(&mut self, event: ExecutionEvent) -> Option<ExecutionEvent> {
        let Some(run_id) = self.run_id else {
            return Some(event);
        };
        if event.run_id() != run_id {
            return None;
        }
        if matches!(event, ExecutionEvent::RunFinished { .. }) {
            self.finished = true;
        }
        Some(event)
    }
}

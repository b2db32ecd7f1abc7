use crate::credentials::InMemoryCredentialStore;
use crate::executor::{RunRequest, RunResult, WorkflowExecutor};
use crate::registry::NodeRegistry;
use crate::state::RunState;
use crate::store::InMemoryRunStore;
use crate::validation::{self, ValidatedGraph};
use chrono::Utc;
use relaycore::{
    CredentialStore, EventBus, EventStream, ExecutionEvent, FlowError, Item, RunId, RunMode,
    RunRecord,
    RunStatus, RunStore, WorkflowGraph,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bookkeeping for a run that has been started and not yet finished
struct ActiveRun {
    state: Arc<Mutex<RunState>>,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<RunResult>>,
}

/// Entry point for starting, stopping and collecting workflow runs
pub struct Engine {
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    store: Arc<dyn RunStore>,
    credentials: Arc<dyn CredentialStore>,
    config: EngineConfig,
    active: Arc<RwLock<HashMap<RunId, ActiveRun>>>,
}

impl Engine {
    /// Engine with in-memory run and credential stores
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            event_bus,
            store: Arc::new(InMemoryRunStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            config,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_credential_store(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn run_store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check a graph without starting a run
    pub fn validate(&self, graph: &WorkflowGraph) -> Result<ValidatedGraph, FlowError> {
        Ok(validation::validate(graph, &self.registry)?)
    }

    /// Validate the graph, create its run record and start executing it in
    /// the background. Trigger nodes receive `initial_items`, or a single
    /// empty item when none are given.
    pub async fn start(
        &self,
        graph: WorkflowGraph,
        initial_items: Vec<Item>,
        triggered_by: &str,
        mode: RunMode,
    ) -> Result<RunId, FlowError> {
        let validated = validation::validate(&graph, &self.registry)?;

        let mut metadata = Map::new();
        metadata.insert("triggeredBy".to_string(), Value::from(triggered_by));
        if !graph.name.is_empty() {
            metadata.insert("workflowName".to_string(), Value::from(graph.name.clone()));
        }
        let record = self
            .store
            .create(graph.id, mode, RunStatus::Pending, metadata)
            .await?;
        let run_id = record.run_id;

        let initial_items = if initial_items.is_empty() {
            vec![Item::empty()]
        } else {
            initial_items
        };

        let state = Arc::new(Mutex::new(RunState::new(run_id, graph.id)));
        let cancellation = CancellationToken::new();
        let request = RunRequest {
            run_id,
            graph: Arc::new(graph),
            validated,
            initial_items,
            triggered_by: triggered_by.to_string(),
            mode,
            state: state.clone(),
            cancellation: cancellation.clone(),
        };

        let executor = WorkflowExecutor::new(
            self.registry.clone(),
            self.event_bus.clone(),
            self.store.clone(),
            self.credentials.clone(),
        )
        .with_max_node_runs(self.config.max_node_runs)
        .with_node_timeout(self.config.node_timeout_ms.map(Duration::from_millis));

        // Register before spawning so stop() can always find the run. The task
        // deregisters itself; from then on the run store holds the outcome.
        let tracked = self.active.clone();
        let mut active = self.active.write().await;
        let handle = tokio::spawn(async move {
            let result = executor.execute(request).await;
            tracked.write().await.remove(&run_id);
            result
        });
        active.insert(
            run_id,
            ActiveRun {
                state,
                cancellation,
                handle: Some(handle),
            },
        );

        tracing::info!("Started run {} ({:?}) by {}", run_id, mode, triggered_by);
        Ok(run_id)
    }

    /// Wait for a started run to reach a terminal status. A run that already
    /// finished is answered from the run store.
    pub async fn wait(&self, run_id: RunId) -> Result<RunResult, FlowError> {
        let handle = {
            let mut active = self.active.write().await;
            match active.get_mut(&run_id) {
                Some(run) => Some(run.handle.take().ok_or_else(|| {
                    FlowError::Execution(format!("Run {} is already being waited on", run_id))
                })?),
                None => None,
            }
        };

        let Some(handle) = handle else {
            let record = self
                .store
                .find_by_id(run_id)
                .await?
                .ok_or(FlowError::RunNotFound(run_id))?;
            return RunResult::from_record(&record);
        };

        match handle.await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.active.write().await.remove(&run_id);
                Err(FlowError::Execution(format!("Run task join error: {}", e)))
            }
        }
    }

    /// Runs started by this engine that have not finished yet
    pub async fn active_runs(&self) -> usize {
        self.active.read().await.len()
    }

    /// Start a run and wait for it to finish
    pub async fn run(
        &self,
        graph: WorkflowGraph,
        initial_items: Vec<Item>,
        triggered_by: &str,
        mode: RunMode,
    ) -> Result<RunResult, FlowError> {
        let run_id = self.start(graph, initial_items, triggered_by, mode).await?;
        self.wait(run_id).await
    }

    /// Request cancellation. Returns `false` if the run already finished.
    /// Once this returns, no further node of the run is started; a node
    /// already executing is allowed to complete.
    pub async fn stop(&self, run_id: RunId) -> Result<bool, FlowError> {
        let entry = {
            let active = self.active.read().await;
            active
                .get(&run_id)
                .map(|run| (run.state.clone(), run.cancellation.clone()))
        };

        let Some((state, cancellation)) = entry else {
            return match self.store.find_by_id(run_id).await? {
                Some(_) => Ok(false),
                None => Err(FlowError::RunNotFound(run_id)),
            };
        };

        cancellation.cancel();

        let mut state = state.lock().await;
        if !state.transition(RunStatus::Cancelled) {
            return Ok(false);
        }

        let mut extra = Map::new();
        extra.insert("stoppedAt".to_string(), Value::from(Utc::now().to_rfc3339()));
        self.store
            .update_status(run_id, RunStatus::Cancelled, extra)
            .await?;

        self.event_bus.emit(ExecutionEvent::RunStopped {
            run_id,
            timestamp: Utc::now(),
        });
        tracing::info!("Run {} cancelled", run_id);

        Ok(true)
    }

    /// Current status: live state for active runs, stored record otherwise
    pub async fn status(&self, run_id: RunId) -> Result<RunStatus, FlowError> {
        let state = {
            let active = self.active.read().await;
            active.get(&run_id).map(|run| run.state.clone())
        };
        if let Some(state) = state {
            return Ok(state.lock().await.status);
        }
        self.find_run(run_id)
            .await?
            .map(|record| record.status)
            .ok_or(FlowError::RunNotFound(run_id))
    }

    pub async fn find_run(&self, run_id: RunId) -> Result<Option<RunRecord>, FlowError> {
        Ok(self.store.find_by_id(run_id).await?)
    }

    /// Subscribe to lifecycle events of every run
    pub fn subscribe_events(&self) -> EventStream {
        self.event_bus.subscribe()
    }

    /// Subscribe to the events of one run; the stream ends after it finishes
    pub fn subscribe_run(&self, run_id: RunId) -> EventStream {
        self.event_bus.subscribe_run(run_id)
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub event_buffer_size: usize,
    /// Upper bound on node executions per run, guards against cycles
    pub max_node_runs: usize,
    /// Optional engine-side limit on a single node invocation
    pub node_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            max_node_runs: 10_000,
            node_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `RELAY_MAX_NODE_RUNS` and `RELAY_NODE_TIMEOUT_MS` when set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = env_number("RELAY_MAX_NODE_RUNS") {
            self.max_node_runs = value as usize;
        }
        if let Some(value) = env_number("RELAY_NODE_TIMEOUT_MS") {
            self.node_timeout_ms = Some(value);
        }
        self
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a number", name, raw);
            None
        }
    }
}

use crate::{
    expression, CredentialData, CredentialError, CredentialStore, EventEmitter, Item, NodeError,
    NodeSpec, RunId, RunMode,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Static data namespace private to the node being executed
pub const NODE_NAMESPACE: &str = "node";

/// Per-invocation view a node implementation gets of its run
#[derive(Clone)]
pub struct ExecutionContext {
    run_id: RunId,
    mode: RunMode,
    node: Arc<NodeSpec>,
    /// Schema defaults merged with the node's configured parameters
    parameters: Map<String, Value>,
    /// Aggregated input batch per input port
    inputs: Vec<Vec<Item>>,
    credentials: Option<CredentialAccess>,
    static_data: StaticDataStore,
    events: EventEmitter,
    cancellation: CancellationToken,
}

#[derive(Clone)]
struct CredentialAccess {
    owner: String,
    store: Arc<dyn CredentialStore>,
}

impl ExecutionContext {
    pub fn new(
        run_id: RunId,
        node: Arc<NodeSpec>,
        parameters: Map<String, Value>,
        inputs: Vec<Vec<Item>>,
        events: EventEmitter,
    ) -> Self {
        Self {
            run_id,
            mode: RunMode::default(),
            node,
            parameters,
            inputs,
            credentials: None,
            static_data: StaticDataStore::default(),
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_credentials(mut self, owner: impl Into<String>, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(CredentialAccess {
            owner: owner.into(),
            store,
        });
        self
    }

    pub fn with_static_data(mut self, static_data: StaticDataStore) -> Self {
        self.static_data = static_data;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn node(&self) -> &NodeSpec {
        &self.node
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.events
    }

    /// Set once the run has been stopped; long-running nodes may poll it
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn input_ports(&self) -> usize {
        self.inputs.len()
    }

    /// Items aggregated on an input port; empty for an unknown port
    pub fn get_input_data(&self, port: usize) -> &[Item] {
        self.inputs.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Items on input port 0
    pub fn items(&self) -> &[Item] {
        self.get_input_data(0)
    }

    /// Parameter value with expressions resolved against the input item at
    /// `item_index`, or `default` when the parameter is not set.
    pub fn get_parameter(&self, name: &str, item_index: usize, default: Value) -> Value {
        match self.parameters.get(name) {
            Some(raw) => {
                let item = self
                    .items()
                    .get(item_index)
                    .map(|item| &item.json)
                    .unwrap_or(&Value::Null);
                expression::resolve_value(raw, item)
            }
            None => default,
        }
    }

    /// Parameter that must be present
    pub fn require_parameter(&self, name: &str, item_index: usize) -> Result<Value, NodeError> {
        if !self.parameters.contains_key(name) {
            return Err(NodeError::InvalidParameter {
                name: name.to_string(),
                message: "parameter is required".to_string(),
            });
        }
        Ok(self.get_parameter(name, item_index, Value::Null))
    }

    /// Parameter that must resolve to a string
    pub fn get_parameter_str(&self, name: &str, item_index: usize) -> Result<String, NodeError> {
        match self.require_parameter(name, item_index)? {
            Value::String(s) => Ok(s),
            other => Err(NodeError::InvalidParameter {
                name: name.to_string(),
                message: format!("expected a string, got {}", other),
            }),
        }
    }

    /// Raw parameters, expressions left unresolved
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Decrypted credential of `credential_type` for the run's owner.
    /// Picks the credential the node references when it names one.
    pub async fn get_credentials(&self, credential_type: &str) -> Result<CredentialData, CredentialError> {
        let not_found = |owner: &str| CredentialError::NotFound {
            owner: owner.to_string(),
            credential_type: credential_type.to_string(),
        };

        let access = self.credentials.as_ref().ok_or_else(|| not_found(""))?;
        let candidates = access
            .store
            .find_by_owner_and_type(&access.owner, credential_type)
            .await?;

        let selected = match self.node.credentials.get(credential_type) {
            Some(reference) => candidates.into_iter().find(|c| {
                reference.id.as_deref() == Some(c.id.as_str())
                    || reference.name.as_deref() == Some(c.name.as_str())
            }),
            None => candidates.into_iter().next(),
        };

        if selected.is_none() {
            tracing::debug!(
                "No '{}' credential for owner '{}' on node {}",
                credential_type,
                access.owner,
                self.node.id
            );
        }
        selected.ok_or_else(|| not_found(&access.owner))
    }

    /// Scratch space shared by every node of this run.
    /// The `"node"` namespace is private to the current node.
    pub fn get_static_data(&self, namespace: &str) -> StaticData {
        let key = if namespace == NODE_NAMESPACE {
            format!("{}:{}", NODE_NAMESPACE, self.node.id)
        } else {
            namespace.to_string()
        };
        self.static_data.namespace(key)
    }
}

/// Workflow-scoped key/value storage living for the duration of one run
#[derive(Clone, Default)]
pub struct StaticDataStore {
    inner: Arc<RwLock<HashMap<String, Map<String, Value>>>>,
}

impl StaticDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, namespace: impl Into<String>) -> StaticData {
        StaticData {
            namespace: namespace.into(),
            store: self.clone(),
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, Map<String, Value>> {
        self.inner.read().await.clone()
    }
}

/// Handle on one namespace of a `StaticDataStore`
#[derive(Clone)]
pub struct StaticData {
    namespace: String,
    store: StaticDataStore,
}

impl StaticData {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let data = self.store.inner.read().await;
        data.get(&self.namespace).and_then(|ns| ns.get(key)).cloned()
    }

    /// Returns the previous value
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        let mut data = self.store.inner.write().await;
        data.entry(self.namespace.clone())
            .or_default()
            .insert(key.into(), value)
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let mut data = self.store.inner.write().await;
        data.get_mut(&self.namespace).and_then(|ns| ns.remove(key))
    }

    pub async fn entries(&self) -> Map<String, Value> {
        let data = self.store.inner.read().await;
        data.get(&self.namespace).cloned().unwrap_or_default()
    }
}

use relaycore::{Node, NodeDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A node type as known to the registry
#[derive(Clone)]
pub struct RegisteredNode {
    pub descriptor: NodeDescriptor,
    pub implementation: Arc<dyn Node>,
}

/// Registry of available node types, keyed by type name then version
pub struct NodeRegistry {
    nodes: HashMap<String, BTreeMap<u32, RegisteredNode>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register an implementation under `node_type` at `descriptor.version`.
    /// Registering the same type and version again replaces the entry.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        descriptor: NodeDescriptor,
        implementation: Arc<dyn Node>,
    ) {
        let node_type = node_type.into();
        tracing::info!(
            "Registering node type: {} v{}",
            node_type,
            descriptor.version
        );
        self.nodes.entry(node_type).or_default().insert(
            descriptor.version,
            RegisteredNode {
                descriptor,
                implementation,
            },
        );
    }

    /// Descriptor of the latest version of a type
    pub fn lookup(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.latest(node_type).map(|n| &n.descriptor)
    }

    /// Descriptor for a specific version, falling back to the latest one
    pub fn lookup_version(&self, node_type: &str, version: u32) -> Option<&NodeDescriptor> {
        self.get(node_type, version).map(|n| &n.descriptor)
    }

    /// Descriptor and implementation for a specific version, falling back
    /// to the latest registered version of the type
    pub fn get(&self, node_type: &str, version: u32) -> Option<&RegisteredNode> {
        let versions = self.nodes.get(node_type)?;
        versions
            .get(&version)
            .or_else(|| versions.values().next_back())
    }

    pub fn implementation(&self, node_type: &str, version: u32) -> Option<Arc<dyn Node>> {
        self.get(node_type, version).map(|n| n.implementation.clone())
    }

    /// Owned copy of the latest descriptor, for catalog listings
    pub fn get_descriptor(&self, node_type: &str) -> Option<NodeDescriptor> {
        self.lookup(node_type).cloned()
    }

    /// All registered type names, sorted
    pub fn list_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.nodes.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn versions(&self, node_type: &str) -> Vec<u32> {
        self.nodes
            .get(node_type)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.nodes.contains_key(node_type)
    }

    fn latest(&self, node_type: &str) -> Option<&RegisteredNode> {
        self.nodes
            .get(node_type)
            .and_then(|versions| versions.values().next_back())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

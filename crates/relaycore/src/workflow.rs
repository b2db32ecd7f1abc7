use crate::ReadinessPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Node identifier, unique within one graph
pub type NodeId = String;

/// Complete workflow definition handed to the engine for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Connections,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes: Vec::new(),
            connections: Connections::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        source_port: usize,
        target: impl Into<NodeId>,
        target_port: usize,
    ) {
        self.connections
            .connect(source.into(), source_port, target.into(), target_port);
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Node instance inside a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default = "default_type_version")]
    pub type_version: u32,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Credential type -> which stored credential to use
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, CredentialRef>,
    /// Overrides the readiness policy declared by the node type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessPolicy>,
}

fn default_type_version() -> u32 {
    1
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            type_version: default_type_version(),
            parameters: Map::new(),
            credentials: BTreeMap::new(),
            readiness: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.type_version = version;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_credential(
        mut self,
        credential_type: impl Into<String>,
        reference: CredentialRef,
    ) -> Self {
        self.credentials.insert(credential_type.into(), reference);
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Name used in events and logs
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Points a node at one stored credential, by id or by name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CredentialRef {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

/// Destination of a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub node: NodeId,
    pub port: usize,
}

/// Outbound connections keyed by source node, then by source output port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connections(BTreeMap<NodeId, Vec<Vec<ConnectionTarget>>>);

impl Connections {
    pub fn connect(
        &mut self,
        source: NodeId,
        source_port: usize,
        target: NodeId,
        target_port: usize,
    ) {
        let ports = self.0.entry(source).or_default();
        if ports.len() <= source_port {
            ports.resize_with(source_port + 1, Vec::new);
        }
        ports[source_port].push(ConnectionTarget {
            node: target,
            port: target_port,
        });
    }

    /// Targets fed by `(source, port)`; empty for a terminal branch
    pub fn outgoing(&self, source: &str, port: usize) -> &[ConnectionTarget] {
        self.0
            .get(source)
            .and_then(|ports| ports.get(port))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every connection as `(source, source_port, target)`
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, usize, &ConnectionTarget)> {
        self.0.iter().flat_map(|(source, ports)| {
            ports.iter().enumerate().flat_map(move |(port, targets)| {
                targets.iter().map(move |target| (source, port, target))
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use crate::{Batch, ExecutionContext, NodeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Capability tag marking node types that can originate a run
pub const TRIGGER_TAG: &str = "trigger";

/// Core trait that all executable node types implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node against its aggregated input
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError>;

    /// Optional: reject bad static parameters before a run starts
    fn validate_parameters(&self, _parameters: &Map<String, Value>) -> Result<(), NodeError> {
        Ok(())
    }
}

/// When a node with several inbound connections may execute
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Every fresh batch on any inbound connection schedules the node
    #[default]
    AnyInput,
    /// Wait until every inbound connection has fresh data, then run once.
    /// Counts connections, not declared input ports: two sources wired into
    /// the same port must both deliver, and a port with nothing connected
    /// is not waited on.
    AllInputs,
}

impl ReadinessPolicy {
    /// `expected` are the inbound connections of the node, `fresh` those
    /// that delivered data since the node last ran.
    pub fn is_ready<K: Ord>(&self, expected: &BTreeSet<K>, fresh: &BTreeSet<K>) -> bool {
        match self {
            ReadinessPolicy::AnyInput => !fresh.is_empty(),
            ReadinessPolicy::AllInputs => !expected.is_empty() && expected.is_subset(fresh),
        }
    }
}

/// Static description of a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub inputs: usize,
    pub outputs: usize,
    #[serde(default)]
    pub credentials: Vec<CredentialRequirement>,
    /// Group / capability tags, `"trigger"` marks origin nodes
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

fn default_version() -> u32 {
    1
}

impl NodeDescriptor {
    pub fn new(display_name: impl Into<String>, inputs: usize, outputs: usize) -> Self {
        Self {
            display_name: display_name.into(),
            description: String::new(),
            version: default_version(),
            inputs,
            outputs,
            credentials: Vec::new(),
            tags: Vec::new(),
            readiness: ReadinessPolicy::AnyInput,
            parameters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn trigger(self) -> Self {
        self.with_tag(TRIGGER_TAG)
    }

    pub fn with_credential(mut self, credential_type: impl Into<String>, required: bool) -> Self {
        self.credentials.push(CredentialRequirement {
            credential_type: credential_type.into(),
            required,
        });
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_trigger(&self) -> bool {
        self.has_tag(TRIGGER_TAG)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Schema defaults overlaid with the node's configured values.
    /// Keys the schema does not know about are kept as-is.
    pub fn resolve_parameters(&self, configured: &Map<String, Value>) -> Map<String, Value> {
        let mut resolved = Map::new();
        for schema in &self.parameters {
            if let Some(default) = &schema.default {
                resolved.insert(schema.name.clone(), default.clone());
            }
        }
        for (key, value) in configured {
            resolved.insert(key.clone(), value.clone());
        }
        resolved
    }

    /// Required parameters that are neither configured nor defaulted
    pub fn missing_parameters(&self, configured: &Map<String, Value>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required && p.default.is_none() && !configured.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRequirement {
    pub credential_type: String,
    pub required: bool,
}

/// One recognized configuration option of a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            required: false,
            description: String::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Json,
    Options(Vec<String>),
}

/// Batches produced by one execution, indexed by output port
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeOutput {
    pub ports: Vec<Option<Batch>>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single batch on output port 0
    pub fn single(batch: Batch) -> Self {
        Self::new().with_batch(0, batch)
    }

    pub fn with_batch(mut self, port: usize, batch: Batch) -> Self {
        if self.ports.len() <= port {
            self.ports.resize(port + 1, None);
        }
        self.ports[port] = Some(batch);
        self
    }

    pub fn batch(&self, port: usize) -> Option<&Batch> {
        self.ports.get(port).and_then(Option::as_ref)
    }

    /// Ports that produced at least one item, in port order
    pub fn produced(&self) -> impl Iterator<Item = (usize, &Batch)> {
        self.ports
            .iter()
            .enumerate()
            .filter_map(|(port, batch)| batch.as_ref().map(|b| (port, b)))
            .filter(|(_, batch)| !batch.is_empty())
    }

    pub fn item_counts(&self) -> Vec<usize> {
        self.ports
            .iter()
            .map(|batch| batch.as_ref().map_or(0, Vec::len))
            .collect()
    }
}

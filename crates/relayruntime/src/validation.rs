use crate::registry::NodeRegistry;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use relaycore::{GraphError, NodeId, WorkflowGraph};
use std::collections::{BTreeSet, HashMap, HashSet};

/// One connection as seen from its target node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Inbound {
    pub source: NodeId,
    pub source_port: usize,
    pub port: usize,
}

/// A graph that passed pre-run validation
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    /// Trigger nodes in graph order
    pub triggers: Vec<NodeId>,
    pub has_cycles: bool,
    inbound: HashMap<NodeId, BTreeSet<Inbound>>,
}

impl ValidatedGraph {
    /// Every connection feeding `node_id`
    pub fn inbound(&self, node_id: &str) -> BTreeSet<Inbound> {
        self.inbound.get(node_id).cloned().unwrap_or_default()
    }
}

/// Check ids, types, parameters and connections, and discover triggers.
/// Nothing is created or persisted when this fails.
pub fn validate(graph: &WorkflowGraph, registry: &NodeRegistry) -> Result<ValidatedGraph, GraphError> {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }

    let mut descriptors = HashMap::new();
    for node in &graph.nodes {
        let registered = registry
            .get(&node.node_type, node.type_version)
            .ok_or_else(|| GraphError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                version: node.type_version,
            })?;

        let missing = registered.descriptor.missing_parameters(&node.parameters);
        if !missing.is_empty() {
            return Err(GraphError::InvalidParameters {
                node_id: node.id.clone(),
                message: format!("missing required parameters: {}", missing.join(", ")),
            });
        }
        registered
            .implementation
            .validate_parameters(&node.parameters)
            .map_err(|e| GraphError::InvalidParameters {
                node_id: node.id.clone(),
                message: e.to_string(),
            })?;

        descriptors.insert(node.id.as_str(), &registered.descriptor);
    }

    let mut dag = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, _> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), dag.add_node(n.id.as_str())))
        .collect();
    let mut inbound: HashMap<NodeId, BTreeSet<Inbound>> = HashMap::new();

    for (source, source_port, target) in graph.connections.iter() {
        let dangling = |reason: &str| GraphError::DanglingConnection {
            source_node: source.clone(),
            source_port,
            target_node: target.node.clone(),
            target_port: target.port,
            reason: reason.to_string(),
        };

        let source_desc = descriptors
            .get(source.as_str())
            .ok_or_else(|| dangling("source node does not exist"))?;
        if source_port >= source_desc.outputs {
            return Err(dangling(&format!(
                "source has {} output port(s)",
                source_desc.outputs
            )));
        }
        let target_desc = descriptors
            .get(target.node.as_str())
            .ok_or_else(|| dangling("target node does not exist"))?;
        if target.port >= target_desc.inputs {
            return Err(dangling(&format!(
                "target has {} input port(s)",
                target_desc.inputs
            )));
        }

        inbound.entry(target.node.clone()).or_default().insert(Inbound {
            source: source.clone(),
            source_port,
            port: target.port,
        });
        dag.add_edge(indices[source.as_str()], indices[target.node.as_str()], ());
    }

    let triggers: Vec<NodeId> = graph
        .nodes
        .iter()
        .filter(|n| descriptors.get(n.id.as_str()).is_some_and(|d| d.is_trigger()))
        .map(|n| n.id.clone())
        .collect();
    if triggers.is_empty() {
        return Err(GraphError::NoTrigger);
    }

    let has_cycles = is_cyclic_directed(&dag);
    if has_cycles {
        tracing::warn!(
            "Workflow {} contains cycles; execution is bounded by max_node_runs",
            graph.id
        );
    }

    tracing::debug!(
        "Validated workflow {}: {} nodes, {} connections, triggers {:?}",
        graph.id,
        graph.nodes.len(),
        graph.connections.len(),
        triggers
    );

    Ok(ValidatedGraph {
        triggers,
        has_cycles,
        inbound,
    })
}

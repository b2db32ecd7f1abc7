use crate::{NodeId, RunId, RunStatus};
use thiserror::Error;

/// Top-level error returned by engine operations
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Run store error: {0}")]
    Store(#[from] StoreError),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raised while validating a graph, before any run record exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Workflow has no trigger node")]
    NoTrigger,

    #[error("Dangling connection {source_node}[{source_port}] -> {target_node}[{target_port}]: {reason}")]
    DanglingConnection {
        source_node: NodeId,
        source_port: usize,
        target_node: NodeId,
        target_port: usize,
        reason: String,
    },

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    #[error("Invalid parameters on node {node_id}: {message}")]
    InvalidParameters { node_id: NodeId, message: String },

    #[error("Unknown node type '{node_type}' (version {version}) on node {node_id}")]
    UnknownNodeType {
        node_id: NodeId,
        node_type: String,
        version: u32,
    },
}

/// Failure surfaced by a node implementation
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input on port {0}")]
    MissingInput(usize),

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Node panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("No '{credential_type}' credential found for owner '{owner}'")]
    NotFound {
        owner: String,
        credential_type: String,
    },

    #[error("Credential store failure: {0}")]
    Store(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Run record not found: {0}")]
    NotFound(RunId),

    #[error("Invalid status transition for run {run_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

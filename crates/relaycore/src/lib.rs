//! Core abstractions for the relay workflow engine
//!
//! Data model (graphs, items, run records), the node contract, the
//! per-invocation execution context, expression resolution, lifecycle
//! events and the collaborator traits the runtime depends on.

mod context;
mod credentials;
mod error;
pub mod events;
pub mod expression;
mod item;
mod node;
mod run;
mod store;
mod workflow;

pub use context::{ExecutionContext, StaticData, StaticDataStore, NODE_NAMESPACE};
pub use credentials::{CredentialData, CredentialStore};
pub use error::{CredentialError, FlowError, GraphError, NodeError, StoreError};
pub use events::*;
pub use item::{BinaryData, Batch, Item, PairedItem};
pub use node::{
    CredentialRequirement, Node, NodeDescriptor, NodeOutput, ParameterKind, ParameterSchema,
    ReadinessPolicy, TRIGGER_TAG,
};
pub use run::{
    NodeRunData, OutputHistory, RunError, RunId, RunMode, RunRecord, RunStatus, DURATION_KEY,
    ERROR_KEY, EXECUTION_ORDER_KEY, RUN_DATA_KEY,
};
pub use store::{apply_status_update, RunStore};
pub use workflow::{
    ConnectionTarget, Connections, CredentialRef, NodeId, NodeSpec, WorkflowGraph, WorkflowId,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

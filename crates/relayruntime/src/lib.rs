//! Workflow execution runtime
//!
//! This crate provides the engine that validates workflow graphs, runs
//! them through the node registry, tracks run state and persists run
//! records.

mod credentials;
mod executor;
mod registry;
mod runtime;
mod state;
mod store;
mod validation;

pub use credentials::InMemoryCredentialStore;
pub use executor::{RunRequest, RunResult, WorkflowExecutor};
pub use registry::{NodeRegistry, RegisteredNode};
pub use runtime::{Engine, EngineConfig};
pub use state::{InputTracker, RunState};
pub use store::{InMemoryRunStore, JsonFileRunStore};
pub use validation::{validate, Inbound, ValidatedGraph};

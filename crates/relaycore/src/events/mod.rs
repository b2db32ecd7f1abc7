mod base;

pub use base::{EventBus, EventEmitter, EventStream, ExecutionEvent, NodeEvent, OutputSummary};

//! Standard node library
//!
//! Collection of built-in node types for common operations

mod debug;
mod http;
mod time;
mod transform;
mod trigger;

pub use debug::DebugNode;
pub use http::{HttpRequestNode, HEADER_AUTH_CREDENTIAL};
pub use time::DelayNode;
pub use transform::{IfNode, MergeNode, NoOpNode, SetNode};
pub use trigger::ManualTriggerNode;
use relayruntime::NodeRegistry;

use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(
        ManualTriggerNode::NODE_TYPE,
        ManualTriggerNode::descriptor(),
        Arc::new(ManualTriggerNode),
    );
    registry.register(SetNode::NODE_TYPE, SetNode::descriptor(), Arc::new(SetNode));
    registry.register(IfNode::NODE_TYPE, IfNode::descriptor(), Arc::new(IfNode));
    registry.register(MergeNode::NODE_TYPE, MergeNode::descriptor(), Arc::new(MergeNode));
    registry.register(NoOpNode::NODE_TYPE, NoOpNode::descriptor(), Arc::new(NoOpNode));
    registry.register(DebugNode::NODE_TYPE, DebugNode::descriptor(), Arc::new(DebugNode));
    registry.register(DelayNode::NODE_TYPE, DelayNode::descriptor(), Arc::new(DelayNode));
    registry.register(
        HttpRequestNode::NODE_TYPE,
        HttpRequestNode::descriptor(),
        Arc::new(HttpRequestNode::new()),
    );
}

use async_trait::async_trait;
use relaycore::{
    ExecutionContext, Node, NodeDescriptor, NodeError, NodeOutput, ParameterKind, ParameterSchema,
};
use serde_json::Value;

/// Logs every input item and passes it through unchanged
pub struct DebugNode;

impl DebugNode {
    pub const NODE_TYPE: &'static str = "debug.log";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("Debug Log", 1, 1)
            .with_description("Logs input items for debugging")
            .with_tag("debug")
            .with_parameter(
                ParameterSchema::new("message", ParameterKind::String)
                    .with_description("Optional message, may reference {{ $json.field }}"),
            )
    }
}

#[async_trait]
impl Node for DebugNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let items = ctx.items();

        for (index, item) in items.iter().enumerate() {
            match ctx.get_parameter("message", index, Value::Null) {
                Value::Null => ctx.emitter().info(format!("DEBUG [{}]: {}", index, item.json)),
                Value::String(message) => ctx.emitter().info(format!("DEBUG [{}]: {}", index, message)),
                other => ctx.emitter().info(format!("DEBUG [{}]: {}", index, other)),
            }
        }
        tracing::debug!("debug.log on {} saw {} item(s)", ctx.node().id, items.len());

        Ok(NodeOutput::single(items.to_vec()))
    }
}

use async_trait::async_trait;
use relaycore::{ExecutionContext, Node, NodeDescriptor, NodeError, NodeOutput};

/// Starts a run by hand; emits the items the run was started with
pub struct ManualTriggerNode;

impl ManualTriggerNode {
    pub const NODE_TYPE: &'static str = "manual.trigger";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("Manual Trigger", 0, 1)
            .with_description("Starts the workflow with the items supplied by the caller")
            .with_tag("core")
            .trigger()
    }
}

#[async_trait]
impl Node for ManualTriggerNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let items = ctx.items().to_vec();
        ctx.emitter()
            .info(format!("Triggered with {} item(s)", items.len()));
        Ok(NodeOutput::single(items))
    }
}

use async_trait::async_trait;
use relaycore::{
    ExecutionContext, Node, NodeDescriptor, NodeError, NodeOutput, ParameterKind, ParameterSchema,
};
use serde_json::Value;
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration
pub struct DelayNode;

impl DelayNode {
    pub const NODE_TYPE: &'static str = "time.delay";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("Delay", 1, 1)
            .with_description("Delay execution for specified milliseconds")
            .with_tag("time")
            .with_parameter(
                ParameterSchema::new("delay_ms", ParameterKind::Number).with_default(1000),
            )
    }
}

#[async_trait]
impl Node for DelayNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let delay_ms = ctx
            .get_parameter("delay_ms", 0, Value::from(1000))
            .as_u64()
            .ok_or_else(|| NodeError::InvalidParameter {
                name: "delay_ms".to_string(),
                message: "expected a non-negative integer".to_string(),
            })?;

        ctx.emitter().info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation().cancelled() => return Err(NodeError::Cancelled),
        }

        Ok(NodeOutput::single(ctx.items().to_vec()))
    }
}

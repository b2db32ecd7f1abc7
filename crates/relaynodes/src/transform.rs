use async_trait::async_trait;
use relaycore::{
    ExecutionContext, Item, Node, NodeDescriptor, NodeError, NodeOutput, ParameterKind,
    ParameterSchema, ReadinessPolicy,
};
use serde_json::{Map, Value};

/// Set fields on every item; values may reference the item with expressions
pub struct SetNode;

impl SetNode {
    pub const NODE_TYPE: &'static str = "core.set";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("Set", 1, 1)
            .with_description("Set fields on each item")
            .with_tag("transform")
            .with_parameter(
                ParameterSchema::new("values", ParameterKind::Json)
                    .required()
                    .with_description("Object of field -> value, values may use {{ $json.path }}"),
            )
            .with_parameter(
                ParameterSchema::new("keep_only_set", ParameterKind::Boolean).with_default(false),
            )
    }
}

#[async_trait]
impl Node for SetNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let keep_only_set = ctx
            .get_parameter("keep_only_set", 0, Value::Bool(false))
            .as_bool()
            .unwrap_or(false);

        let mut output = Vec::with_capacity(ctx.items().len());
        for (index, item) in ctx.items().iter().enumerate() {
            let values = match ctx.get_parameter("values", index, Value::Object(Map::new())) {
                Value::Object(values) => values,
                other => {
                    return Err(NodeError::InvalidParameter {
                        name: "values".to_string(),
                        message: format!("expected an object, got {}", other),
                    })
                }
            };

            let mut json = match (&item.json, keep_only_set) {
                (Value::Object(existing), false) => existing.clone(),
                _ => Map::new(),
            };
            json.extend(values);

            let mut next = Item::new(Value::Object(json)).paired_with(index, 0);
            next.binary = item.binary.clone();
            output.push(next);
        }

        Ok(NodeOutput::single(output))
    }

    fn validate_parameters(&self, parameters: &Map<String, Value>) -> Result<(), NodeError> {
        match parameters.get("values") {
            Some(Value::Object(_)) | None => Ok(()),
            Some(other) => Err(NodeError::InvalidParameter {
                name: "values".to_string(),
                message: format!("expected an object, got {}", other),
            }),
        }
    }
}

/// Route items to output 0 when `condition` is truthy, output 1 otherwise
pub struct IfNode;

impl IfNode {
    pub const NODE_TYPE: &'static str = "core.if";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("If", 1, 2)
            .with_description("Split items into true / false branches")
            .with_tag("flow")
            .with_parameter(
                ParameterSchema::new("condition", ParameterKind::String)
                    .required()
                    .with_description("Expression evaluated per item, e.g. {{ $json.active }}"),
            )
    }
}

#[async_trait]
impl Node for IfNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let mut matched = Vec::new();
        let mut rest = Vec::new();

        for (index, item) in ctx.items().iter().enumerate() {
            let condition = ctx.get_parameter("condition", index, Value::Null);
            let next = item.clone().paired_with(index, 0);
            if is_truthy(&condition) {
                matched.push(next);
            } else {
                rest.push(next);
            }
        }

        Ok(NodeOutput::new().with_batch(0, matched).with_batch(1, rest))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(values) => !values.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Join two branches once both delivered
pub struct MergeNode;

impl MergeNode {
    pub const NODE_TYPE: &'static str = "core.merge";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("Merge", 2, 1)
            .with_description("Wait for both inputs, then append or combine their items")
            .with_tag("flow")
            .with_readiness(ReadinessPolicy::AllInputs)
            .with_parameter(
                ParameterSchema::new(
                    "mode",
                    ParameterKind::Options(vec!["append".to_string(), "combine".to_string()]),
                )
                .with_default("append"),
            )
    }
}

#[async_trait]
impl Node for MergeNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let first = ctx.get_input_data(0);
        let second = ctx.get_input_data(1);

        let mode = ctx.get_parameter("mode", 0, Value::from("append"));
        let merged: Vec<Item> = match mode.as_str() {
            Some("append") => first
                .iter()
                .enumerate()
                .map(|(i, item)| item.clone().paired_with(i, 0))
                .chain(
                    second
                        .iter()
                        .enumerate()
                        .map(|(i, item)| item.clone().paired_with(i, 1)),
                )
                .collect(),
            Some("combine") => first
                .iter()
                .zip(second.iter())
                .enumerate()
                .map(|(i, (a, b))| {
                    let mut json = a.json.as_object().cloned().unwrap_or_default();
                    if let Some(other) = b.json.as_object() {
                        json.extend(other.clone());
                    }
                    Item::new(Value::Object(json)).paired_with(i, 0)
                })
                .collect(),
            _ => {
                return Err(NodeError::InvalidParameter {
                    name: "mode".to_string(),
                    message: format!("unsupported merge mode {}", mode),
                })
            }
        };

        Ok(NodeOutput::single(merged))
    }
}

/// Pass items through untouched
pub struct NoOpNode;

impl NoOpNode {
    pub const NODE_TYPE: &'static str = "core.noop";

    pub fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new("No Operation", 1, 1)
            .with_description("Pass items through untouched")
            .with_tag("core")
    }
}

#[async_trait]
impl Node for NoOpNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::single(ctx.items().to_vec()))
    }
}

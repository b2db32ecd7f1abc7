// crates/relayruntime/tests/engine_test.rs

use async_trait::async_trait;
use relaycore::{
    BinaryData, CredentialData, ExecutionContext, ExecutionEvent, Item, Node, NodeDescriptor,
    NodeError, NodeOutput, NodeSpec, ReadinessPolicy, RunMode, RunStatus, RunStore,
    WorkflowGraph,
};
use relayruntime::{
    Engine, EngineConfig, InMemoryCredentialStore, JsonFileRunStore, NodeRegistry,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Emits whatever the run was started with
struct TriggerNode;

#[async_trait]
impl Node for TriggerNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::single(ctx.items().to_vec()))
    }
}

/// Copies every item from every input port, tagging it with the node id
struct PassNode;

#[async_trait]
impl Node for PassNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let mut items = Vec::new();
        for port in 0..ctx.input_ports() {
            for item in ctx.get_input_data(port) {
                let mut json = item.json.as_object().cloned().unwrap_or_default();
                json.insert("seen_by".to_string(), Value::from(ctx.node().id.clone()));
                items.push(Item::new(Value::Object(json)));
            }
        }
        Ok(NodeOutput::single(items))
    }
}

struct FailNode;

#[async_trait]
impl Node for FailNode {
    async fn execute(&self, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

struct PanicNode;

#[async_trait]
impl Node for PanicNode {
    async fn execute(&self, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        panic!("node blew up");
    }
}

/// Sleeps far longer than any test waits
struct SlowNode;

#[async_trait]
impl Node for SlowNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(NodeOutput::single(ctx.items().to_vec()))
    }
}

/// Signals when it starts, then blocks until released
struct GateNode {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Node for GateNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(NodeOutput::single(ctx.items().to_vec()))
    }
}

/// Resolves the `value` parameter per item and emits `{ "value": ... }`
struct EchoParameterNode;

#[async_trait]
impl Node for EchoParameterNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let items = (0..ctx.items().len())
            .map(|i| Item::new(json!({ "value": ctx.get_parameter("value", i, Value::Null) })))
            .collect();
        Ok(NodeOutput::single(items))
    }
}

/// Emits the `token` field of its `api` credential
struct CredentialNode;

#[async_trait]
impl Node for CredentialNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let credential = ctx.get_credentials("api").await?;
        Ok(NodeOutput::single(vec![Item::new(
            json!({ "token": credential.get_str("token") }),
        )]))
    }
}

/// Increments a counter in the global static data namespace
struct CounterNode;

#[async_trait]
impl Node for CounterNode {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let data = ctx.get_static_data("global");
        let count = data.get("count").await.and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        data.set("count", Value::from(count)).await;
        Ok(NodeOutput::single(vec![Item::new(json!({ "count": count }))]))
    }
}

fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(
        "test.trigger",
        NodeDescriptor::new("Trigger", 0, 1).trigger(),
        Arc::new(TriggerNode),
    );
    registry.register("test.pass", NodeDescriptor::new("Pass", 1, 1), Arc::new(PassNode));
    registry.register(
        "test.join",
        NodeDescriptor::new("Join", 2, 1).with_readiness(ReadinessPolicy::AllInputs),
        Arc::new(PassNode),
    );
    registry.register("test.fail", NodeDescriptor::new("Fail", 1, 1), Arc::new(FailNode));
    registry.register("test.panic", NodeDescriptor::new("Panic", 1, 1), Arc::new(PanicNode));
    registry.register(
        "test.echo",
        NodeDescriptor::new("Echo", 1, 1),
        Arc::new(EchoParameterNode),
    );
    registry.register(
        "test.credential",
        NodeDescriptor::new("Credential", 1, 1).with_credential("api", true),
        Arc::new(CredentialNode),
    );
    registry.register("test.counter", NodeDescriptor::new("Counter", 1, 1), Arc::new(CounterNode));
    registry.register("test.slow", NodeDescriptor::new("Slow", 1, 1), Arc::new(SlowNode));
    registry
}

fn engine() -> Engine {
    init_tracing();
    Engine::new(Arc::new(test_registry()))
}

/// trigger -> n1 -> n2 -> ... -> n{len}
fn chain(len: usize) -> WorkflowGraph {
    let mut workflow = WorkflowGraph::new("chain");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    let mut previous = "trigger".to_string();
    for i in 1..=len {
        let id = workflow.add_node(NodeSpec::new(format!("n{}", i), "test.pass"));
        workflow.connect(previous.clone(), 0, id.clone(), 0);
        previous = id;
    }
    workflow
}

/// trigger -> a, trigger -> b, a -> join[0], b -> join[port_b]
fn diamond(policy: ReadinessPolicy, port_b: usize) -> WorkflowGraph {
    let mut workflow = WorkflowGraph::new("diamond");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("a", "test.pass"));
    workflow.add_node(NodeSpec::new("b", "test.pass"));
    workflow.add_node(NodeSpec::new("join", "test.join").with_readiness(policy));
    workflow.connect("trigger", 0, "a", 0);
    workflow.connect("trigger", 0, "b", 0);
    workflow.connect("a", 0, "join", 0);
    workflow.connect("b", 0, "join", port_b);
    workflow
}

#[tokio::test]
async fn test_linear_chain_completes_in_order() {
    let engine = engine();
    let mut events = engine.subscribe_events();

    let result = engine
        .run(chain(3), vec![], "user-1", RunMode::Manual)
        .await
        .expect("run should finish");

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.execution_order, vec!["trigger", "n1", "n2", "n3"]);
    assert_eq!(result.history.len(), 4);
    assert!(result.history.values().all(|runs| runs.len() == 1));

    let last = result.history["n3"][0].batch(0).expect("n3 produced items");
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].json["seen_by"], "n3");

    // Start/end pairing per node, in execution order
    let events = events.drain();
    let lifecycle: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::NodeStarted { node_id, .. } => Some(format!("start:{}", node_id)),
            ExecutionEvent::NodeCompleted { node_id, .. } => Some(format!("end:{}", node_id)),
            _ => None,
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            "start:trigger", "end:trigger", "start:n1", "end:n1", "start:n2", "end:n2",
            "start:n3", "end:n3",
        ]
    );
    let totals: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::NodeCompleted { output_summary, .. } => {
                Some(output_summary.total_items())
            }
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![1, 1, 1, 1]);
}

#[tokio::test]
async fn test_initial_items_reach_trigger() {
    let engine = engine();
    let items = vec![Item::new(json!({"id": 1})), Item::new(json!({"id": 2}))];

    let result = engine
        .run(chain(1), items, "user-1", RunMode::Webhook)
        .await
        .unwrap();

    let out = result.history["n1"][0].batch(0).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].json["id"], 2);
}

#[tokio::test]
async fn test_fan_out_runs_each_branch_once() {
    let engine = engine();
    let mut workflow = WorkflowGraph::new("fan-out");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("left", "test.pass"));
    workflow.add_node(NodeSpec::new("right", "test.pass"));
    workflow.connect("trigger", 0, "left", 0);
    workflow.connect("trigger", 0, "right", 0);

    let result = engine.run(workflow, vec![], "user-1", RunMode::Manual).await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.runs_of("left"), 1);
    assert_eq!(result.runs_of("right"), 1);
}

#[tokio::test]
async fn test_all_inputs_join_runs_once_with_both_branches() {
    let engine = engine();

    let result = engine
        .run(diamond(ReadinessPolicy::AllInputs, 1), vec![], "user-1", RunMode::Manual)
        .await
        .unwrap();

    assert_eq!(result.runs_of("join"), 1);
    // One item from each branch
    assert_eq!(result.history["join"][0].batch(0).unwrap().len(), 2);
    assert_eq!(result.runs_of("a"), 1);
    assert_eq!(result.runs_of("b"), 1);
}

#[tokio::test]
async fn test_all_inputs_join_on_single_port_waits_for_both_connections() {
    let engine = engine();

    let result = engine
        .run(diamond(ReadinessPolicy::AllInputs, 0), vec![], "user-1", RunMode::Manual)
        .await
        .unwrap();

    assert_eq!(result.runs_of("join"), 1);
    assert_eq!(result.history["join"][0].batch(0).unwrap().len(), 2);
}

#[tokio::test]
async fn test_all_inputs_join_ignores_unconnected_ports() {
    let engine = engine();

    // "test.join" declares two inputs; only port 1 is wired
    let mut workflow = WorkflowGraph::new("half joined");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("a", "test.pass"));
    workflow.add_node(NodeSpec::new("join", "test.join"));
    workflow.connect("trigger", 0, "a", 0);
    workflow.connect("a", 0, "join", 1);

    let result = engine.run(workflow, vec![], "user-1", RunMode::Manual).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.runs_of("join"), 1);
}

#[tokio::test]
async fn test_any_input_join_runs_per_arrival() {
    let engine = engine();

    let result = engine
        .run(diamond(ReadinessPolicy::AnyInput, 1), vec![], "user-1", RunMode::Manual)
        .await
        .unwrap();

    assert_eq!(result.runs_of("join"), 2);
    // First arrival sees only branch a, second sees the latest from both
    assert_eq!(result.history["join"][0].batch(0).unwrap().len(), 1);
    assert_eq!(result.history["join"][1].batch(0).unwrap().len(), 2);
    assert_eq!(
        result.execution_order,
        vec!["trigger", "a", "join", "b", "join"]
    );
}

#[tokio::test]
async fn test_failure_stops_run_and_keeps_upstream_output() {
    let engine = engine();
    let mut events = engine.subscribe_events();

    let mut workflow = WorkflowGraph::new("failing");
    workflow.add_node(NodeSpec::new("a", "test.trigger"));
    workflow.add_node(NodeSpec::new("b", "test.fail").with_name("Breaks"));
    workflow.add_node(NodeSpec::new("c", "test.pass"));
    workflow.add_node(NodeSpec::new("side", "test.pass"));
    workflow.connect("a", 0, "b", 0);
    workflow.connect("a", 0, "side", 0);
    workflow.connect("b", 0, "c", 0);

    let result = engine.run(workflow, vec![], "user-1", RunMode::Manual).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.clone().expect("failed run records an error");
    assert_eq!(error.node_id.as_deref(), Some("b"));
    assert_eq!(error.node_name.as_deref(), Some("Breaks"));
    assert!(!error.message.is_empty());
    assert!(error.message.contains("boom"));

    assert_eq!(result.runs_of("a"), 1);
    assert_eq!(result.runs_of("c"), 0);
    // The sibling branch was still queued when b failed
    assert_eq!(result.runs_of("side"), 0);

    let events = events.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::NodeFailed { node_id, .. } if node_id == "b"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ExecutionEvent::RunFinished { success: false, .. }
    )));

    let record = engine.find_run(result.run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.completed_at.is_some());
    assert_eq!(record.error().map(|e| e.message.is_empty()), Some(false));
}

#[tokio::test]
async fn test_panicking_node_fails_the_run() {
    let engine = engine();
    let mut workflow = chain(0);
    workflow.add_node(NodeSpec::new("p", "test.panic"));
    workflow.connect("trigger", 0, "p", 0);

    let result = engine.run(workflow, vec![], "user-1", RunMode::Manual).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error.unwrap().message.contains("panicked"));
}

#[tokio::test]
async fn test_stop_cancels_and_suppresses_further_nodes() {
    init_tracing();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut registry = test_registry();
    registry.register(
        "test.gate",
        NodeDescriptor::new("Gate", 1, 1),
        Arc::new(GateNode {
            entered: entered.clone(),
            release: release.clone(),
        }),
    );
    let engine = Engine::new(Arc::new(registry));
    let mut events = engine.subscribe_events();

    let mut workflow = WorkflowGraph::new("cancellable");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("gate", "test.gate"));
    workflow.add_node(NodeSpec::new("after", "test.pass"));
    workflow.connect("trigger", 0, "gate", 0);
    workflow.connect("gate", 0, "after", 0);

    let run_id = engine
        .start(workflow, vec![], "user-1", RunMode::Manual)
        .await
        .unwrap();

    let mut run_events = engine.subscribe_run(run_id);
    entered.notified().await;
    assert_eq!(engine.status(run_id).await.unwrap(), RunStatus::Running);

    assert!(engine.stop(run_id).await.unwrap());
    assert_eq!(engine.status(run_id).await.unwrap(), RunStatus::Cancelled);
    release.notify_one();

    let result = engine.wait(run_id).await.unwrap();
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.runs_of("after"), 0);
    // The in-flight gate still finished and was recorded
    assert_eq!(result.runs_of("gate"), 1);

    let events = events.drain();
    let stopped_at = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::RunStopped { .. }))
        .expect("stop event emitted");
    assert!(!events[stopped_at..]
        .iter()
        .any(|e| matches!(e, ExecutionEvent::NodeStarted { .. })));

    let run_events = run_events.drain();
    assert!(run_events.iter().all(|e| e.run_id() == run_id));
    assert!(matches!(
        run_events.last(),
        Some(ExecutionEvent::RunFinished { success: false, .. })
    ));

    let record = engine.find_run(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Cancelled);

    // Stopping a finished run is a no-op
    assert!(!engine.stop(run_id).await.unwrap());
}

#[tokio::test]
async fn test_graph_errors_create_no_run() {
    let engine = engine();

    let mut no_trigger = WorkflowGraph::new("no trigger");
    no_trigger.add_node(NodeSpec::new("a", "test.pass"));
    let workflow_id = no_trigger.id;

    let err = engine
        .start(no_trigger, vec![], "user-1", RunMode::Manual)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        relaycore::FlowError::Graph(relaycore::GraphError::NoTrigger)
    ));

    let runs = engine.run_store().find_by_workflow(workflow_id).await.unwrap();
    assert!(runs.is_empty());
}

#[tokio::test]
async fn test_parameters_resolve_expressions_per_item() {
    let engine = engine();
    let mut workflow = WorkflowGraph::new("expressions");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("echo", "test.echo").with_parameter("value", "{{ $json.a.b }}"));
    workflow.connect("trigger", 0, "echo", 0);

    let items = vec![
        Item::new(json!({"a": {"b": 5}})),
        Item::new(json!({"a": {"b": "text"}})),
    ];
    let result = engine.run(workflow, items, "user-1", RunMode::Manual).await.unwrap();

    let out = result.history["echo"][0].batch(0).unwrap();
    assert_eq!(out[0].json["value"], json!(5));
    assert_eq!(out[1].json["value"], json!("text"));
}

#[tokio::test]
async fn test_credentials_resolve_for_triggering_user() {
    init_tracing();
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let mut data = Map::new();
    data.insert("token".to_string(), Value::from("secret-1"));
    credentials
        .insert(
            "user-1",
            CredentialData {
                id: "cred-1".to_string(),
                name: "Primary".to_string(),
                credential_type: "api".to_string(),
                data,
            },
        )
        .await;

    let engine = Engine::new(Arc::new(test_registry())).with_credential_store(credentials);

    let mut workflow = WorkflowGraph::new("credentials");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("cred", "test.credential"));
    workflow.connect("trigger", 0, "cred", 0);

    let ok = engine
        .run(workflow.clone(), vec![], "user-1", RunMode::Manual)
        .await
        .unwrap();
    assert_eq!(ok.history["cred"][0].batch(0).unwrap()[0].json["token"], "secret-1");

    let missing = engine.run(workflow, vec![], "user-2", RunMode::Manual).await.unwrap();
    assert_eq!(missing.status, RunStatus::Failed);
    assert!(missing.error.unwrap().message.contains("user-2"));
}

#[tokio::test]
async fn test_static_data_shared_within_a_run_only() {
    let engine = engine();
    let mut workflow = WorkflowGraph::new("static data");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("first", "test.counter"));
    workflow.add_node(NodeSpec::new("second", "test.counter"));
    workflow.connect("trigger", 0, "first", 0);
    workflow.connect("first", 0, "second", 0);

    for _ in 0..2 {
        let result = engine
            .run(workflow.clone(), vec![], "user-1", RunMode::Manual)
            .await
            .unwrap();
        assert_eq!(result.history["second"][0].batch(0).unwrap()[0].json["count"], 2);
    }
}

#[tokio::test]
async fn test_cycles_are_bounded_by_max_node_runs() {
    init_tracing();
    let config = EngineConfig {
        max_node_runs: 7,
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(Arc::new(test_registry()), config);

    let mut workflow = WorkflowGraph::new("loop");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("ping", "test.pass"));
    workflow.add_node(NodeSpec::new("pong", "test.pass"));
    workflow.connect("trigger", 0, "ping", 0);
    workflow.connect("ping", 0, "pong", 0);
    workflow.connect("pong", 0, "ping", 0);

    assert!(engine.validate(&workflow).unwrap().has_cycles);

    let result = engine.run(workflow, vec![], "user-1", RunMode::Manual).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.execution_order.len(), 7);
    assert!(result.error.unwrap().message.contains("limit of 7"));
}

#[tokio::test]
async fn test_run_record_carries_mode_and_user() {
    let engine = engine();
    let result = engine.run(chain(2), vec![], "user-1", RunMode::Cron).await.unwrap();

    assert!(result.is_success());
    let record = engine.find_run(result.run_id).await.unwrap().unwrap();
    assert_eq!(record.mode, RunMode::Cron);
    assert_eq!(record.metadata["triggeredBy"], "user-1");
    assert_eq!(record.metadata["executionOrder"], json!(["trigger", "n1", "n2"]));
    let history = record.output_history().unwrap().expect("run data persisted");
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_node_timeout_fails_the_run() {
    init_tracing();
    let config = EngineConfig {
        node_timeout_ms: Some(50),
        ..EngineConfig::default()
    };
    let engine = Engine::with_config(Arc::new(test_registry()), config);

    let mut workflow = chain(0);
    workflow.add_node(NodeSpec::new("slow", "test.slow"));
    workflow.add_node(NodeSpec::new("after", "test.pass"));
    workflow.connect("trigger", 0, "slow", 0);
    workflow.connect("slow", 0, "after", 0);

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        engine.run(workflow, vec![], "user-1", RunMode::Manual),
    )
    .await
    .expect("timeout should end the run early")
    .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.runs_of("after"), 0);
    let error = result.error.expect("timed out run records an error");
    assert_eq!(error.node_id.as_deref(), Some("slow"));
    assert!(error.message.contains("50ms"), "unexpected message: {}", error.message);
}

#[tokio::test]
async fn test_finished_runs_leave_the_active_set() {
    let engine = engine();

    let mut run_ids = Vec::new();
    for _ in 0..20 {
        let run_id = engine
            .start(chain(2), vec![], "user-1", RunMode::Manual)
            .await
            .unwrap();
        run_ids.push(run_id);
    }

    for _ in 0..500 {
        if engine.active_runs().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.active_runs().await, 0);

    // Collected afterwards from the run store
    for run_id in &run_ids {
        assert_eq!(engine.status(*run_id).await.unwrap(), RunStatus::Completed);
    }
    let result = engine.wait(run_ids[0]).await.unwrap();
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.execution_order, vec!["trigger", "n1", "n2"]);
    assert_eq!(result.history["n2"][0].batch(0).unwrap()[0].json["seen_by"], "n2");
    assert!(result.error.is_none());

    let unknown = Uuid::new_v4();
    assert!(matches!(
        engine.wait(unknown).await,
        Err(relaycore::FlowError::RunNotFound(id)) if id == unknown
    ));
}

#[tokio::test]
async fn test_run_data_survives_json_file_store() {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("relay-engine-{}", Uuid::new_v4()));
    let store = Arc::new(JsonFileRunStore::open(&dir).await.unwrap());
    let engine = Engine::new(Arc::new(test_registry())).with_run_store(store);

    let mut workflow = WorkflowGraph::new("persisted");
    workflow.add_node(NodeSpec::new("trigger", "test.trigger"));
    workflow.add_node(NodeSpec::new("pass", "test.pass"));
    workflow.connect("trigger", 0, "pass", 0);

    let items = vec![
        Item::new(json!({
            "order": {"lines": [{"sku": "a-1", "qty": 2}, {"sku": "b-2", "qty": null}]},
            "ratio": 0.25,
            "price": 3.75,
            "note": "héllo"
        }))
        .with_binary(BinaryData {
            mime_type: "text/plain".to_string(),
            file_name: Some("note.txt".to_string()),
            data: "aGVsbG8=".to_string(),
        }),
        Item::new(json!([1, 2, 3])),
    ];
    let result = engine.run(workflow, items, "user-1", RunMode::Webhook).await.unwrap();
    assert!(result.is_success());

    let reopened = JsonFileRunStore::open(&dir).await.unwrap();
    let record = reopened.find_by_id(result.run_id).await.unwrap().unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.mode, RunMode::Webhook);
    assert_eq!(record.metadata["triggeredBy"], "user-1");
    assert_eq!(record.metadata["workflowName"], "persisted");
    assert_eq!(record.output_history().unwrap(), Some(result.history.clone()));
    assert_eq!(record.execution_order(), result.execution_order);
    assert_eq!(record.duration_ms(), Some(result.duration_ms));

    let trigger_out = &record.output_history().unwrap().unwrap()["trigger"][0];
    let first = &trigger_out.batch(0).unwrap()[0];
    assert_eq!(first.json["price"], json!(3.75));
    assert_eq!(first.binary.as_ref().map(|b| b.data.as_str()), Some("aGVsbG8="));

    assert_eq!(Some(record), engine.find_run(result.run_id).await.unwrap());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

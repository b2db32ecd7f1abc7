use anyhow::Result;
use clap::{Parser, Subcommand};
use relaycore::{ExecutionEvent, Item, NodeEvent, NodeSpec, RunMode, WorkflowGraph};
use relayruntime::{Engine, EngineConfig, JsonFileRunStore, NodeRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input items as a JSON object or array of objects
        #[arg(short, long)]
        input: Option<String>,

        /// Engine configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for run records; kept in memory when omitted
        #[arg(long)]
        runs_dir: Option<PathBuf>,

        /// User the run is attributed to
        #[arg(long, default_value = "cli")]
        user: String,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    relaynodes::register_all(&mut registry);
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            config,
            runs_dir,
            user,
            verbose,
        } => {
            init_logging(verbose);
            run_workflow(file, input, config, runs_dir, user).await?;
        }

        Commands::Validate { file } => {
            init_logging(false);
            validate_workflow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(output)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &PathBuf) -> Result<WorkflowGraph> {
    let raw = std::fs::read_to_string(file)?;
    let workflow: WorkflowGraph = serde_json::from_str(&raw)?;
    tracing::debug!("Loaded workflow {} ({})", workflow.name, workflow.id);
    Ok(workflow)
}

/// Accepts `{...}` for one item or `[{...}, ...]` for several
fn parse_input(input: Option<String>) -> Result<Vec<Item>> {
    let Some(raw) = input else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<serde_json::Value>(&raw)? {
        serde_json::Value::Array(values) => Ok(values.into_iter().map(Item::new).collect()),
        value @ serde_json::Value::Object(_) => Ok(vec![Item::new(value)]),
        _ => Err(anyhow::anyhow!("Input must be a JSON object or array")),
    }
}

async fn run_workflow(
    file: PathBuf,
    input: Option<String>,
    config: Option<PathBuf>,
    runs_dir: Option<PathBuf>,
    user: String,
) -> Result<()> {
    println!("Loading workflow from: {}", file.display());
    let workflow = load_workflow(&file)?;

    println!("Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());
    println!();

    let items = parse_input(input)?;
    let config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();

    let mut engine = Engine::with_config(Arc::new(standard_registry()), config);
    if let Some(dir) = runs_dir {
        engine = engine.with_run_store(Arc::new(JsonFileRunStore::open(dir).await?));
    }

    let mut events = engine.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                ExecutionEvent::RunStarted { run_id, .. } => {
                    println!("> Run {} started", run_id);
                }
                ExecutionEvent::NodeStarted { node_id, node_name, .. } => {
                    println!("  - Starting node: {} ({})", node_name, node_id);
                }
                ExecutionEvent::NodeCompleted {
                    node_name,
                    output_summary,
                    duration_ms,
                    ..
                } => {
                    println!(
                        "  + {} completed in {}ms, {} item(s) {:?}",
                        node_name,
                        duration_ms,
                        output_summary.total_items(),
                        output_summary.items_per_port
                    );
                }
                ExecutionEvent::NodeFailed {
                    node_name, message, ..
                } => {
                    println!("  x {} failed: {}", node_name, message);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     [{}] {}", node_id, message),
                    NodeEvent::Warning { message } => {
                        println!("     [{}] warning: {}", node_id, message)
                    }
                    NodeEvent::Progress { percent, message } => match message {
                        Some(msg) => println!("     [{}] {}% - {}", node_id, percent, msg),
                        None => println!("     [{}] {}%", node_id, percent),
                    },
                },
                ExecutionEvent::RunStopped { run_id, .. } => {
                    println!("> Run {} stopped", run_id);
                }
                ExecutionEvent::RunFinished {
                    success,
                    duration_ms,
                    ..
                } => {
                    if success {
                        println!("> Run completed successfully in {}ms", duration_ms);
                    } else {
                        println!("> Run did not complete ({}ms)", duration_ms);
                    }
                    break;
                }
            }
        }
    });

    let result = engine.run(workflow, items, &user, RunMode::Manual).await?;
    let _ = event_task.await;

    println!();
    println!("Execution Summary:");
    println!("   Run ID: {}", result.run_id);
    println!("   Status: {:?}", result.status);
    println!("   Node executions: {}", result.execution_order.len());
    if let Some(error) = &result.error {
        println!(
            "   Error: {} (node {})",
            error.message,
            error.node_id.as_deref().unwrap_or("-")
        );
    }

    if !result.history.is_empty() {
        println!();
        println!("Outputs:");
        for (node_id, runs) in &result.history {
            if let Some(last) = runs.last() {
                println!("   Node {} ({} run(s)):", node_id, runs.len());
                for (port, batch) in last.outputs.iter().enumerate() {
                    if let Some(batch) = batch {
                        println!("     [{}] {}", port, serde_json::to_string(batch)?);
                    }
                }
            }
        }
    }

    if !result.is_success() {
        return Err(anyhow::anyhow!("Run {} ended as {:?}", result.run_id, result.status));
    }

    Ok(())
}

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow = load_workflow(&file)?;
    let registry = standard_registry();
    let validated = relayruntime::validate(&workflow, &registry)?;

    println!("Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());
    println!("   Triggers: {}", validated.triggers.join(", "));
    if validated.has_cycles {
        println!("   Note: graph contains cycles");
    }

    Ok(())
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    let registry = standard_registry();
    for node_type in registry.list_types() {
        if let Some(descriptor) = registry.lookup(&node_type) {
            let versions: Vec<String> = registry
                .versions(&node_type)
                .iter()
                .map(|v| format!("v{}", v))
                .collect();
            println!(
                "  * {} {} [{}] in:{} out:{}",
                node_type,
                versions.join("/"),
                descriptor.tags.join(", "),
                descriptor.inputs,
                descriptor.outputs
            );
            println!("    {}", descriptor.description);
        }
    }
}

fn create_example_workflow(output: PathBuf) -> Result<()> {
    let mut workflow = WorkflowGraph::new("Example Workflow");

    let trigger = workflow.add_node(NodeSpec::new("start", "manual.trigger").with_name("Start"));
    let set = workflow.add_node(
        NodeSpec::new("greet", "core.set")
            .with_name("Greet")
            .with_parameter(
                "values",
                serde_json::json!({ "greeting": "Hello {{ $json.name }}" }),
            ),
    );
    let log = workflow.add_node(NodeSpec::new("log", "debug.log").with_name("Log"));

    workflow.connect(trigger, 0, set.clone(), 0);
    workflow.connect(set, 0, log, 0);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(&output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  relay run --file {} --input '{{\"name\": \"world\"}}'",
        output.display()
    );

    Ok(())
}

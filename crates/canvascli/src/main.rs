// crates/canvascli/src/main.rs

use anyhow::{bail, Context, Result};
use canvascore::{ExecutionEvent, NodeKind, RunStatus, Value, Workflow};
use canvasruntime::api::WorkflowExecutionResponse;
use canvasruntime::{
    templates, CanvasRuntime, DependencyGraph, DirectoryWorkflowStore, InMemoryWorkflowStore,
    NodeRegistry, RunOptions, RuntimeConfig, WorkflowStore,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canvas")]
#[command(about = "Canvas workflow engine CLI", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

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

        /// Value for the first Input node (JSON, or plain text)
        #[arg(short, long)]
        input: Option<String>,

        /// Only run these node ids (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        nodes: Option<Vec<String>>,

        /// Reuse memoized node outputs
        #[arg(long)]
        cache: bool,

        /// Print progress events as JSON lines
        #[arg(short, long)]
        stream: bool,

        /// Runtime config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of saved workflows for nested workflow nodes
        #[arg(short, long)]
        workflows_dir: Option<PathBuf>,

        /// Generation service base URL (overrides CANVAS_GENERATION_URL)
        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List node kinds and their handlers
    Nodes,

    /// Write an example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,

        /// Template id
        #[arg(short, long, default_value = "template-influencer")]
        template: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            input,
            nodes,
            cache,
            stream,
            config,
            workflows_dir,
            remote,
        } => {
            let runtime = build_runtime(config.as_deref(), workflows_dir, remote.as_deref())?;
            let mut workflow = load_workflow(&file)?;
            if let Some(raw) = input {
                workflow = workflow.with_first_input(parse_input(&raw));
            }

            let options = RunOptions {
                node_ids: nodes,
                use_cache: cache,
                ..RunOptions::default()
            };

            if stream {
                stream_workflow(&runtime, workflow, options).await?;
            } else {
                run_workflow(&runtime, &workflow, &options).await?;
            }
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output, template } => {
            create_example_workflow(&output, &template)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&workflow_json).with_context(|| format!("parsing {}", file.display()))
}

/// JSON when it parses, the raw text otherwise.
fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn build_runtime(
    config: Option<&Path>,
    workflows_dir: Option<PathBuf>,
    remote: Option<&str>,
) -> Result<CanvasRuntime> {
    let config = match config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    let store: Arc<dyn WorkflowStore> = match workflows_dir {
        Some(dir) => Arc::new(DirectoryWorkflowStore::new(dir)),
        None => Arc::new(InMemoryWorkflowStore::new()),
    };

    let mut registry = NodeRegistry::new();
    match remote {
        Some(url) => canvasnodes::register_remote(&mut registry, url),
        None => canvasnodes::register_all(&mut registry),
    }

    Ok(CanvasRuntime::with_parts(Arc::new(registry), store, config))
}

async fn run_workflow(
    runtime: &CanvasRuntime,
    workflow: &Workflow,
    options: &RunOptions,
) -> Result<()> {
    println!(
        "📋 Workflow: {} ({} nodes, {} edges)",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len()
    );

    let report = runtime.execute(workflow, options).await?;
    let response = WorkflowExecutionResponse::from(report);

    // declaration order reads better than hash order
    for node in &workflow.nodes {
        let Some(result) = response.results.get(&node.id) else {
            continue;
        };
        match &result.error {
            Some(error) => println!("  ❌ {} failed: {}", node.id, error),
            None => println!("  ✅ {}: {}", node.id, result.output),
        }
    }

    if response.status == RunStatus::Failed {
        bail!("workflow finished with failed nodes");
    }
    println!("✨ Workflow completed");
    Ok(())
}

async fn stream_workflow(
    runtime: &CanvasRuntime,
    workflow: Workflow,
    options: RunOptions,
) -> Result<()> {
    let mut events = runtime.stream(workflow, options, None)?;
    let mut failed = false;

    while let Some(event) = events.next().await {
        print!("{}", event.to_json_line()?);
        if matches!(event, ExecutionEvent::WorkflowFailed { .. } | ExecutionEvent::NodeFailed { .. }) {
            failed = true;
        }
    }

    if failed {
        bail!("workflow finished with failures");
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(file)?;
    let resolution = DependencyGraph::build(&workflow.nodes, &workflow.edges)?.resolve();
    if !resolution.is_complete() {
        let cyclic: Vec<&str> = resolution.unresolved.iter().map(|n| n.id.as_str()).collect();
        bail!("dependency cycle among: {}", cyclic.join(", "));
    }

    for node in workflow.nodes_of_kind(NodeKind::Workflow) {
        if node.data.workflow_id.as_deref().map_or(true, str::is_empty) {
            println!("⚠️  {} references no workflow", node.id);
        }
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    let order: Vec<&str> = resolution.order.iter().map(|n| n.id.as_str()).collect();
    println!("   Order: {}", order.join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Node kinds:");
    println!();

    let mut registry = NodeRegistry::new();
    canvasnodes::register_all(&mut registry);

    for kind in registry.list_node_kinds() {
        if let Some(metadata) = registry.get_metadata(kind) {
            println!("  • {} ({})", kind, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", kind);
        }
    }
}

fn create_example_workflow(output: &Path, template: &str) -> Result<()> {
    let Some(workflow) = templates::find(template)? else {
        let known: Vec<String> = templates::all()?.into_iter().map(|w| w.id).collect();
        bail!("unknown template '{}' (known: {})", template, known.join(", "));
    };

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  canvas run --file {} --stream", output.display());

    Ok(())
}

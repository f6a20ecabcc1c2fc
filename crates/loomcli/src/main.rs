use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use loomcore::{
    events, ExecutionEvent, LogLevel, NodeData, NodeStatus, RunReport, Value, WorkflowDocument,
    WorkflowGraph,
};
use loomruntime::{EngineConfig, NodeRegistry, WorkflowEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loom workflow engine CLI", long_about = None)]
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

        /// Maximum number of concurrent runs
        #[arg(short, long, default_value_t = 4)]
        workers: usize,

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
    Nodes {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Print a human-readable summary of a workflow file
    Summary {
        /// Path to workflow JSON file
        file: PathBuf,

        /// Export format: summary or json
        #[arg(short, long, default_value = "summary")]
        format: String,
    },

    /// Write Markdown documentation for every node type
    Docs {
        /// Output file path; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            file,
            workers,
            verbose,
        } => run_workflow(&file, workers, verbose).await,
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Nodes { category } => {
            list_nodes(category.as_deref());
            Ok(())
        }
        Commands::Summary { file, format } => summarize_workflow(&file, &format),
        Commands::Docs { output } => write_node_docs(output.as_deref()),
        Commands::Init { output } => create_example_workflow(&output),
    }
}

fn registry() -> Arc<NodeRegistry> {
    Arc::new(loomnodes::standard_registry())
}

fn load(file: &Path) -> Result<WorkflowDocument> {
    tracing::debug!(path = %file.display(), "Loading workflow document");
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(WorkflowDocument::from_json(&json)?)
}

async fn run_workflow(file: &Path, workers: usize, verbose: bool) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let document = load(file)?;

    println!("📋 Workflow: {}", document.metadata.name);
    println!("   Nodes: {}", document.nodes.len());
    println!("   Connections: {}", document.connections.len());
    println!();

    let engine = WorkflowEngine::with_config(registry(), EngineConfig { max_workers: workers });
    let (tx, mut rx) = events::channel();
    let execution_id = engine.execute_workflow(&document.into_graph(), Some(tx));
    tracing::info!(%execution_id, workers, "Workflow submitted");
    println!("▶️  Execution {}", execution_id);

    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!(%execution_id, "Interrupted, stopping execution");
                println!("🛑 Stop requested");
                engine.stop_execution(Some(execution_id));
                continue;
            }
        };
        let Some(event) = event else {
            bail!("Event stream closed before the workflow finished");
        };

        match event {
            ExecutionEvent::Log {
                level,
                message,
                node_id,
                ..
            } => {
                if level == LogLevel::Debug && !verbose {
                    continue;
                }
                let icon = match level {
                    LogLevel::Debug => "🔎",
                    LogLevel::Info => "ℹ️ ",
                    LogLevel::Warning => "⚠️ ",
                    LogLevel::Error => "❌",
                    LogLevel::Success => "✅",
                };
                match node_id {
                    Some(node_id) => println!("     {} [{}] {}", icon, node_id, message),
                    None => println!("  {} {}", icon, message),
                }
            }
            ExecutionEvent::NodeStatus {
                node_id, status, ..
            } => {
                if status == NodeStatus::Running {
                    println!("  ⚡ Starting node: {}", node_id);
                }
            }
            ExecutionEvent::Completed {
                success,
                message,
                report,
                ..
            } => {
                println!();
                if success {
                    println!("✨ {}", message);
                } else {
                    println!("💥 {}", message);
                }
                if let Some(report) = report {
                    print_summary(&report);
                }
                if !success {
                    tracing::error!(%execution_id, "{}", message);
                    bail!(message);
                }
                return Ok(());
            }
        }
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", report.execution_id);
    println!("   Status: {}", report.status);
    println!(
        "   Completed: {}/{} nodes",
        report.completed_nodes.len(),
        report.execution_order.len()
    );
    if let Some(ms) = report.duration_ms() {
        println!("   Duration: {}ms", ms);
    }

    if !report.node_outputs.is_empty() {
        println!();
        println!("📤 Outputs:");
        for (node_id, outputs) in &report.node_outputs {
            if outputs.is_empty() {
                continue;
            }
            println!("   Node {}:", node_id);
            let mut pins: Vec<(&String, &Value)> = outputs.iter().collect();
            pins.sort_by(|a, b| a.0.cmp(b.0));
            for (pin, value) in pins {
                println!("     {}: {}", pin, value);
            }
        }
    }
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());
    let document = load(file)?;
    let graph = document.graph();

    let engine = WorkflowEngine::new(registry());
    let issues = engine.validate_workflow(&graph);
    for issue in &issues {
        let icon = if issue.is_error() { "❌" } else { "⚠️ " };
        println!("   {} {}", icon, issue.message);
    }

    let errors = issues.iter().filter(|i| i.is_error()).count();
    tracing::info!(issues = issues.len(), errors, "Validation finished");
    if errors > 0 {
        bail!("Workflow has {} validation error(s)", errors);
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", document.metadata.name);
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Connections: {}", graph.connections.len());
    Ok(())
}

fn summarize_workflow(file: &Path, format: &str) -> Result<()> {
    let document = load(file)?;
    let text = match format {
        "summary" => registry().summarize(&document).to_string(),
        other => document.export_to_format(other)?,
    };
    println!("{}", text);
    Ok(())
}

fn write_node_docs(output: Option<&Path>) -> Result<()> {
    let docs = registry().export_node_documentation();
    match output {
        Some(path) => {
            std::fs::write(path, docs)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Node documentation written");
            println!("📚 Wrote node documentation: {}", path.display());
        }
        None => println!("{}", docs),
    }
    Ok(())
}

fn list_nodes(category: Option<&str>) {
    println!("📦 Available Node Types:");

    let registry = registry();
    for (name, types) in registry.list_categories() {
        if category.is_some_and(|c| !c.eq_ignore_ascii_case(&name)) {
            continue;
        }
        println!();
        println!("{}:", name);
        for node_type in types {
            let Some(schema) = registry.get_schema(&node_type) else {
                continue;
            };
            println!("  {} {} ({})", schema.icon, schema.title, node_type);
            println!("    {}", schema.description);
            let pins = |pins: &[loomcore::PinSpec]| {
                pins.iter()
                    .map(|p| format!("{}: {}", p.name, p.pin_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            if !schema.inputs.is_empty() {
                println!("    in:  {}", pins(&schema.inputs));
            }
            if !schema.outputs.is_empty() {
                println!("    out: {}", pins(&schema.outputs));
            }
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut graph = WorkflowGraph::new();
    graph.add_node(
        "input",
        NodeData::new("text_input")
            .with_title("Greeting")
            .with_property("text", "hello from loom")
            .with_position(100.0, 100.0),
    );
    graph.add_node(
        "shout",
        NodeData::new("text_processor")
            .with_title("Shout")
            .with_property("operation", "uppercase")
            .with_position(300.0, 100.0),
    );
    graph.add_node(
        "print",
        NodeData::new("text_output")
            .with_title("Print")
            .with_property("suffix", "!")
            .with_position(500.0, 100.0),
    );
    graph.connect("input", "text", "shout", "text");
    graph.connect("shout", "result", "print", "text");

    let mut document = WorkflowDocument::from_graph("Example Text Workflow", graph);
    document.metadata.description = "Uppercases a greeting and prints it".to_string();
    std::fs::write(output, document.to_json_pretty()?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(path = %output.display(), "Example workflow written");

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  loom run --file {}", output.display());
    Ok(())
}

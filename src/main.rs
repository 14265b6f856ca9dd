mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agentdag_core::config::AppConfig;
use agentdag_core::error::DagError;
use agentdag_core::types::NodeOutcome;
use agentdag_engine::{sequencer, AgentRegistry, Executor, Graph};

const DEFAULT_CONFIG: &str = "agentdag.toml";
const DEFAULT_GRAPH: &str = "graph.yaml";

#[derive(Parser)]
#[command(name = "agentdag", version, about = "Run a graph of agents concurrently, children first")]
struct Cli {
    /// Path to config file (defaults to ./agentdag.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging for agentdag crates
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph and print its root results
    Run {
        /// Graph file
        #[arg(short, long, default_value = DEFAULT_GRAPH)]
        graph: PathBuf,
        /// Print only these roots (repeatable); every node still runs
        #[arg(long = "root")]
        roots: Vec<String>,
        /// Stream run events to stdout as JSON lines
        #[arg(long)]
        events: bool,
    },
    /// Show execution order and parallel stages
    Plan {
        #[arg(short, long, default_value = DEFAULT_GRAPH)]
        graph: PathBuf,
    },
    /// Load and validate a graph without running it
    Validate {
        #[arg(short, long, default_value = DEFAULT_GRAPH)]
        graph: PathBuf,
    },
    /// List registered agent kinds
    Kinds,
    /// Check configuration, graph, and credentials
    Doctor {
        #[arg(short, long, default_value = DEFAULT_GRAPH)]
        graph: PathBuf,
    },
    /// Show effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "agentdag", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };

    // Initialize tracing; RUST_LOG wins over config
    let filter = if cli.verbose {
        EnvFilter::new("agentdag=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(config);
    let agents = Arc::new(agentdag_agents::with_builtins(&config)?);

    match cli.command {
        Commands::Run {
            graph,
            roots,
            events,
        } => run_graph(&graph, &roots, events, config, agents).await?,
        Commands::Plan { graph } => {
            let graph = load_graph(&graph)?;
            print_plan(&graph, &agents)?;
        }
        Commands::Validate { graph: path } => {
            let graph = load_graph(&path)?;
            agents.resolve(&graph)?;
            println!(
                "{}: OK ({} nodes, roots: {})",
                path.display(),
                graph.len(),
                graph.roots().join(", ")
            );
        }
        Commands::Kinds => {
            for (kind, description) in agents.describe() {
                println!("  {:<24} {}", kind, description);
            }
        }
        Commands::Doctor { graph } => {
            println!("agentdag doctor");
            println!("===============");
            let issues = doctor::run_doctor(&config, &graph, &agents);
            if issues > 0 {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", config.to_toml_string()?);
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    Graph::load(path).with_context(|| format!("loading graph {}", path.display()))
}

async fn run_graph(
    path: &Path,
    selected: &[String],
    events: bool,
    config: Arc<AppConfig>,
    agents: Arc<AgentRegistry>,
) -> anyhow::Result<()> {
    let graph = Arc::new(load_graph(path)?);
    for root in selected {
        if !graph.contains(root) {
            return Err(DagError::UnknownRoot(root.clone()).into());
        }
    }

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling run...");
        cancel_clone.cancel();
    });

    let executor = Executor::new(graph.clone(), agents, config).with_cancel(cancel.clone());

    let printer = events.then(|| {
        let mut rx = executor.event_bus().subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Failed to encode event"),
                    },
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let report = executor.run().await?;
    drop(executor);
    if let Some(printer) = printer {
        printer.await.ok();
    }

    if cancel.is_cancelled() {
        return Err(DagError::Cancelled.into());
    }

    let roots = if selected.is_empty() {
        report.roots.clone()
    } else {
        selected.to_vec()
    };

    let mut missing = Vec::new();
    for root in &roots {
        match report.outcome(root) {
            Some(NodeOutcome::Success(value)) => {
                if roots.len() > 1 {
                    println!("== {} ==", root);
                }
                println!("{}", value);
            }
            _ => missing.push(root.clone()),
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    eprintln!("Run {} did not produce every result:", report.run_id);
    for (node, reason) in report.failures() {
        eprintln!("  {}: {}", node, reason);
    }
    let failed = report
        .failures()
        .into_iter()
        .map(|(node, _)| node)
        .collect();
    Err(DagError::RunFailed { failed }.into())
}

fn print_plan(graph: &Graph, agents: &AgentRegistry) -> anyhow::Result<()> {
    let order = sequencer::sort(graph)?;
    let stages = sequencer::stages(graph)?;

    println!("Execution order:");
    for (i, id) in order.iter().enumerate() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let registered = if agents.contains(node.kind()) {
            ""
        } else {
            "  [unknown kind]"
        };
        if node.children.is_empty() {
            println!("  {:>3}. {} ({}){}", i + 1, id, node.kind(), registered);
        } else {
            println!(
                "  {:>3}. {} ({}) <- {}{}",
                i + 1,
                id,
                node.kind(),
                node.children.join(", "),
                registered
            );
        }
    }

    println!();
    println!("Parallel stages:");
    for (i, stage) in stages.iter().enumerate() {
        println!("  {:>3}: {}", i + 1, stage.join(", "));
    }

    println!();
    println!("Roots: {}", graph.roots().join(", "));
    Ok(())
}

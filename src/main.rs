use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use harbormind_core::config::AppConfig;
use harbormind_core::error::HarbormindError;
use harbormind_core::event::{EventBus, PlanEvent};
use harbormind_core::types::{Observation, SessionContext, SessionId};
use harbormind_memory::SqliteStore;
use harbormind_plan::{PlanRunner, TaskGraph};
use harbormind_skills::{builtin_catalog, builtin_registry};

#[derive(Parser)]
#[command(name = "harbormind", version, about = "Marina assistant plan executor")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "harbormind.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan against a user observation and print its actions
    Run {
        /// Graph id to execute
        #[arg(short, long)]
        graph: String,
        /// Observation payload as JSON (plain text is wrapped as {"text": ...})
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// List the graphs in the catalog
    Graphs,
    /// List the registered handlers
    Handlers,
    /// Validate a TOML graph definition file
    Validate {
        /// Path to the graph file
        file: PathBuf,
    },
    /// Show current configuration
    Config,
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    match AppConfig::load(path) {
        Ok(config) => Ok(config),
        Err(HarbormindError::ConfigNotFound(_)) => {
            warn!(path = %path.display(), "No config file, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = match config.memory.db_path {
        Some(ref path) => SqliteStore::open(Path::new(path))?,
        None => SqliteStore::in_memory()?,
    };
    Ok(Arc::new(store))
}

fn build_runner(config: &AppConfig, events: Arc<EventBus>) -> anyhow::Result<PlanRunner> {
    let mut catalog = builtin_catalog()?;
    if let Some(ref dir) = config.graphs.dir {
        let loaded = catalog.load_dir(Path::new(dir))?;
        info!(dir, loaded, "Extra graphs loaded");
    }
    Ok(PlanRunner::new(catalog, builtin_registry())
        .with_events(events)
        .with_limits(config.executor.clone()))
}

async fn cmd_run(
    config: AppConfig,
    session: Option<String>,
    graph: String,
    input: Vec<String>,
) -> anyhow::Result<()> {
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let runner = build_runner(&config, Arc::clone(&events))?;

    let store = open_store(&config)?;
    let session_id = session.map(|s| SessionId::from_str(&s)).unwrap_or_default();
    let ctx = SessionContext::new(session_id)
        .with_memory(Arc::clone(&store) as _)
        .with_documents(store as _);

    let raw = input.join(" ");
    let payload =
        serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({ "text": raw }));
    let observation = Observation::user_input(payload);

    let progress = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                PlanEvent::NodeStart { node_id, handler, .. } => {
                    eprintln!("  -> {node_id} [{handler}]");
                }
                PlanEvent::RunComplete { nodes_visited, actions, .. } => {
                    eprintln!("  done: {nodes_visited} nodes, {actions} actions");
                }
                _ => {}
            }
        }
    });

    let result = runner.run_graph(&graph, &ctx, &observation).await;
    progress.abort();

    // The executor fails fast; turning that into a degraded user-facing
    // message is this layer's job.
    match result {
        Ok(actions) => {
            for action in &actions {
                println!("{}", serde_json::to_string(action)?);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("The assistant could not complete this request: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)?;
    let graph = TaskGraph::from_toml_str(&raw)?;
    graph.validate()?;
    println!(
        "{}: ok ({} nodes, entry '{}')",
        graph.id,
        graph.nodes.len(),
        graph.entry
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { graph, input } => cmd_run(config, cli.session, graph, input).await,
        Commands::Graphs => {
            let runner = build_runner(&config, Arc::new(EventBus::default()))?;
            for id in runner.catalog().list() {
                if let Some(graph) = runner.catalog().get(id) {
                    println!("{id}  ({} nodes)  {}", graph.nodes.len(), graph.name);
                }
            }
            Ok(())
        }
        Commands::Handlers => {
            let runner = build_runner(&config, Arc::new(EventBus::default()))?;
            for name in runner.registry().list() {
                let handler = runner.resolve_handler(name);
                println!("{name}  {}", handler.describe());
            }
            Ok(())
        }
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

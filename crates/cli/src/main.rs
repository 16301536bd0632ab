mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use db::TaskRepository;
use events::NotificationBridge;
use opencode::OpenCodeClient;
use orchestrator::{standard_pipelines, ExecutorContext, Orchestrator};
use server::{create_router, state::AppState};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcs::GitVcs;

use config::{PhaseflowConfig, CONFIG_FILE, PHASEFLOW_DIR};

#[derive(Parser)]
#[command(name = "phaseflow")]
#[command(about = "Agent-driven task pipelines, from analysis to merged pull request", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port to listen on, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// OpenCode server URL, overrides the config file
    #[arg(long, global = true)]
    opencode_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .phaseflow/ with a default config and database
    Init,
    /// Start the API server
    Serve,
    /// List the built-in pipelines
    Pipelines,
    /// Show stored tasks and their pull requests
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.command {
        Some(Commands::Init) => init_project(&root).await,
        Some(Commands::Pipelines) => {
            list_pipelines();
            Ok(())
        }
        Some(Commands::Status) => status(&root).await,
        Some(Commands::Serve) | None => {
            let mut config = PhaseflowConfig::load(&root).await?;
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(url) = cli.opencode_url {
                config.opencode.url = url;
            }
            serve(&root, config).await
        }
    }
}

async fn init_project(root: &Path) -> Result<()> {
    let config_path = PhaseflowConfig::path(root);
    if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
        println!("Project already initialized at {}", config_path.display());
        return Ok(());
    }

    let config = PhaseflowConfig::default();
    config.save(root).await?;
    db::open_database(&config.database_path(root)).await?;
    tokio::fs::write(
        root.join(PHASEFLOW_DIR).join(".gitignore"),
        "phaseflow.db*\nworktrees/\n",
    )
    .await?;

    println!("Initialized phaseflow in {}", root.display());
    println!();
    println!("Created:");
    println!("  {}/", PHASEFLOW_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  ├── .gitignore");
    println!("  └── {}", config.database.path.display());
    println!();
    println!("Run 'phaseflow serve' to start the server");

    Ok(())
}

fn list_pipelines() {
    for pipeline in standard_pipelines() {
        println!("{:<10} {}", pipeline.name(), pipeline.phase_names().join(" → "));
        println!("{:<10} {}", "", pipeline.description());
    }
}

async fn status(root: &Path) -> Result<()> {
    let config = PhaseflowConfig::load(root).await?;
    let db_path = config.database_path(root);
    if !tokio::fs::try_exists(&db_path).await.unwrap_or(false) {
        println!("No database at {}. Run 'phaseflow init' first.", db_path.display());
        return Ok(());
    }

    let tasks = TaskRepository::new(db::open_database(&db_path).await?)
        .find_all()
        .await?;

    if tasks.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }

    println!("Tasks ({}):", tasks.len());
    for task in &tasks {
        let pr = task
            .pull_request
            .as_ref()
            .map(|pr| format!("PR #{}", pr.number))
            .unwrap_or_else(|| "no PR".to_string());
        println!("  {} [{}] {}", task.id, pr, task.title);
    }

    Ok(())
}

async fn serve(root: &Path, config: PhaseflowConfig) -> Result<()> {
    init_tracing();

    let db_path = config.database_path(root);
    tracing::info!(path = %db_path.display(), "Opening database");
    let pool = db::open_database(&db_path)
        .await
        .context("Failed to open database")?;
    let tasks = TaskRepository::new(pool);

    if !GitVcs::is_available().await {
        tracing::warn!("gh CLI is not installed or not authenticated, merge phases will fail");
    }

    let mut agent = OpenCodeClient::new(config.opencode.url.clone());
    if let (Some(provider), Some(model)) = (&config.opencode.provider_id, &config.opencode.model_id) {
        agent = agent.with_model(provider, model);
    }
    tracing::info!(url = %agent.base_url(), "Using OpenCode server");

    let ctx = Arc::new(ExecutorContext::new(
        config.orchestrator.executor_config(root),
        Arc::new(agent),
        Arc::new(GitVcs::new()),
        Arc::new(tasks.clone()),
        NotificationBridge::new(),
    ));

    let mut orchestrator = Orchestrator::new(ctx);
    for pipeline in standard_pipelines() {
        orchestrator.register_pipeline(pipeline)?;
    }

    let app = create_router(AppState::new(Arc::new(orchestrator), tasks));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port)).await?;

    println!();
    println!("phaseflow");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", config.server.port);
    println!("  Observers:   ws://localhost:{}/ws", config.server.port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,phaseflow=debug".into()),
        )
        .init();
}

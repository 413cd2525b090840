//! Relay Gateway Service
//!
//! `relay-gateway [serve]` runs the HTTP gateway. `relay-gateway context` is
//! the execution-context role: the gateway re-runs its own binary with this
//! subcommand once per job in process mode.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use job_supervisor::{serve_stdio, Executor, Operation, ProcessExecutor, Supervisor, TaskExecutor};
use relay_gateway::{
    create_router, AppState, AuthMode, BackendOperation, Config, ContextSettings, ExecutionMode,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "relay-gateway", version, about = "Authenticated relay for shielded deposits and withdrawals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve,
    /// Execute one job read from stdin and report on stdout
    Context,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Context => context().await,
    }
}

fn env_filter(default: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into())
}

async fn serve() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(env_filter("relay_gateway=debug,job_supervisor=debug,tower_http=debug"))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Relay Gateway");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let settings = config.context_settings();
    info!("Configuration loaded");
    info!("  Environment: {:?}", config.environment);
    info!("  API address: {}", config.api_address());
    info!("  Backend: {}", settings.endpoint());
    info!("  Mock mode: {}", config.mock_mode);
    info!("  Execution mode: {:?}", config.execution_mode);
    info!("  Job timeout: {}ms", config.job_timeout.as_millis());
    info!("  Max concurrent jobs: {}", config.max_concurrent_jobs);

    let auth = config.auth_mode();
    if let AuthMode::Disabled = auth {
        warn!("RELAY_SECRET is not set: the gateway is running WITHOUT authentication (development only)");
    }

    let executor = build_executor(config.execution_mode, &settings)?;
    let supervisor = Supervisor::new(executor, config.max_concurrent_jobs);

    let state = AppState::new(supervisor, auth, settings, config.job_timeout);
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Relay Gateway listening on {}", config.api_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("Relay Gateway stopped");
    Ok(())
}

fn build_executor(mode: ExecutionMode, settings: &ContextSettings) -> Result<Arc<dyn Executor>> {
    match mode {
        ExecutionMode::Process => {
            let executor = ProcessExecutor::current_exe(vec!["context".to_string()])
                .context("Failed to locate the relay-gateway binary")?
                .with_settings(serde_json::to_value(settings)?);
            Ok(Arc::new(executor))
        }
        ExecutionMode::Task => {
            let operation: Arc<dyn Operation> = Arc::new(BackendOperation::new(settings.clone()));
            Ok(Arc::new(TaskExecutor::new(operation)))
        }
    }
}

async fn context() -> Result<()> {
    // stdout carries the report; logs go to stderr only
    tracing_subscriber::registry()
        .with(env_filter("relay_gateway=info,job_supervisor=info"))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    serve_stdio(|job, settings: ContextSettings| async move {
        BackendOperation::new(settings).execute(job).await
    })
    .await
}

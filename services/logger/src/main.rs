//! ---
//! logd_section: "01-core-functionality"
//! logd_subsection: "binary"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Binary entrypoint for the logd service."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logd_api::{spawn_api_server, ApiState};
use logd_common::{init_tracing, AppConfig, IngestMetrics, LoadedAppConfig};
use logd_msg::{queue_source, ConsumerHandle, ConsumerLoop, ConsumerState};
use logd_persistence::{connect_store, Ingestor};
use prometheus::Registry;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Centralized log-collection service", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Environment file to load before reading configuration [default: .env if present]"
    )]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP API and queue consumer")]
    Run,
    #[command(about = "Load and validate configuration, then print it")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_file = load_env_file(cli.env_file.as_deref())?;

    let LoadedAppConfig { config, source } =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            match &source {
                Some(path) => println!("# loaded from {}", path.display()),
                None => println!("# built-in defaults"),
            }
            println!("{config:#?}");
            Ok(())
        }
        Commands::Run => {
            init_tracing(&config.service.name, &config.logging)?;
            if let Some(path) = env_file {
                info!(env_file = %path.display(), "environment file loaded");
            }
            match &source {
                Some(path) => info!(config = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; using defaults"),
            }
            run_service(config).await
        }
    }
}

fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => dotenvy::from_path(path)
            .map(|_| Some(path.to_path_buf()))
            .with_context(|| format!("failed to load environment file {}", path.display())),
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(err) if err.not_found() => Ok(None),
            Err(err) => Err(err).context("failed to load .env"),
        },
    }
}

async fn run_service(config: AppConfig) -> Result<()> {
    let registry = Arc::new(Registry::new());
    let metrics = IngestMetrics::new(registry).context("failed to register ingestion metrics")?;

    let store = connect_store(&config.store, &config.service.name)
        .await
        .context("failed to connect to log store")?;
    let ingestor = Ingestor::new(store, metrics);

    let consumer = match queue_source(&config.queue, &config.service.name)? {
        Some(source) => Some(ConsumerLoop::new(source, ingestor.clone()).spawn()),
        None => {
            info!("queue ingestion disabled by configuration");
            None
        }
    };

    let server = spawn_api_server(
        Arc::new(ApiState::new(ingestor)),
        &config.api,
        config.service.listen,
    )?;
    info!(
        service = %config.service.name,
        address = %server.addr(),
        "logd running; waiting for termination signal"
    );

    let outcome = match consumer {
        Some(consumer) => supervise(consumer).await,
        None => {
            shutdown_signal().await;
            Ok(())
        }
    };

    info!("shutting down api server");
    server.shutdown().await?;
    outcome
}

/// Wait for a termination signal while watching the consumer. A faulted
/// consumer ends the process with an error; a cleanly closed one leaves the
/// HTTP surface running.
async fn supervise(consumer: ConsumerHandle) -> Result<()> {
    let mut state = consumer.watch_state();
    tokio::select! {
        _ = shutdown_signal() => {
            consumer.abort();
            return Ok(());
        }
        finished = state.wait_for(ConsumerState::is_terminal) => {
            drop(finished);
        }
    }

    match consumer.join().await {
        Ok(()) => {
            warn!("queue subscription ended; continuing with http ingestion only");
            shutdown_signal().await;
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "queue consumer failed");
            Err(err).context("queue consumer stopped")
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("ctrl-c received");
        }
        _ = terminate => info!("SIGTERM received"),
    }
}

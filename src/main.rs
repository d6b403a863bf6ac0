//! Fledge statistics history service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stats_history::api::{create_router, AppState};
use stats_history::config::{Config, VERBOSE_LOG_DIRECTIVE};
use stats_history::history::{HistoryScheduler, StatisticsHistoryRoller};
use stats_history::metrics;
use stats_history::storage::StorageClient;
use stats_history::utils::{shutdown_signal, wait_for_shutdown};

/// Fledge statistics history service.
#[derive(Parser, Debug)]
#[command(name = "stats-history")]
#[command(about = "Rolls Fledge statistics counters into statistics history")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Management API port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and management API (default).
    Run {
        /// Management API port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Perform a single roll and exit.
    Once,

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration is read before logging starts so RUST_LOG and VERBOSE apply.
    let loaded = Config::load();
    let directive = match &loaded {
        Ok(config) => config.log_directive(args.verbose),
        Err(_) if args.verbose => VERBOSE_LOG_DIRECTIVE.to_string(),
        Err(_) => "info".to_string(),
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(loaded),
        Some(Command::Once) => cmd_once(loaded).await,
        Some(Command::Run { port }) => cmd_run(loaded, port.or(args.port)).await,
        None => cmd_run(loaded, args.port).await,
    }
}

/// Apply overrides to loaded configuration and validate it.
fn prepare_config(
    loaded: Result<Config, envy::Error>,
    port_override: Option<u16>,
) -> anyhow::Result<Config> {
    let mut config = loaded.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Build the roller over the Fledge storage service.
fn build_roller(config: &Config) -> anyhow::Result<StatisticsHistoryRoller> {
    let client = StorageClient::new(config)?;
    info!("Using storage service at {}", client.base_url());
    Ok(StatisticsHistoryRoller::new(Arc::new(client)))
}

/// Check configuration validity.
fn cmd_check_config(loaded: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("STATISTICS HISTORY - CONFIGURATION CHECK");
    println!("======================================================================");

    let config = prepare_config(loaded, None)?;

    println!("Configuration Summary:");
    println!("  Storage URL: {}", config.storage_url);
    println!("  Storage Timeout: {}ms", config.storage_timeout_ms);
    println!("  Roll Interval: {}s", config.history_interval_seconds);
    println!("  Management Port: {}", config.port);
    println!(
        "  Metrics: {}",
        if config.metrics_enabled {
            format!("Enabled on port {}", config.metrics_port)
        } else {
            "Disabled".to_string()
        }
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Perform a single roll.
async fn cmd_once(loaded: Result<Config, envy::Error>) -> anyhow::Result<()> {
    let config = prepare_config(loaded, None)?;
    let roller = build_roller(&config)?;

    let report = roller.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Run the scheduler and management API until shutdown.
async fn cmd_run(
    loaded: Result<Config, envy::Error>,
    port_override: Option<u16>,
) -> anyhow::Result<()> {
    let config = prepare_config(loaded, port_override)?;

    if config.metrics_enabled {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        match PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            Ok(()) => info!("Metrics exporter listening on {}", metrics_addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    // Must follow exporter install; descriptions sent earlier are dropped.
    metrics::init_metrics();

    let scheduler = HistoryScheduler::new(build_roller(&config)?, config.history_interval());
    let app_state = AppState::new(scheduler.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Management API listening on {}", addr);

    let signal_state = app_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_state.request_shutdown();
    });

    info!(
        "Rolling statistics history every {}s",
        scheduler.interval().as_secs()
    );

    let scheduler_handle = tokio::spawn(scheduler.run_until(app_state.shutdown_receiver()));

    let router = create_router(app_state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(app_state.shutdown_receiver()))
        .await?;

    scheduler_handle.await?;
    info!("Statistics history service stopped");

    Ok(())
}

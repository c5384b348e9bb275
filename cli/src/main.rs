use anyhow::Context;
use clap::Parser;
use ece_cli::{build_service, DaemonConfig, StorageKind};
use ece_treasury::LedgerStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ece-treasuryd")]
#[command(about = "ECE treasury service", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address the HTTP API binds to
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Directory holding the sled ledger
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    storage: Option<StorageKind>,

    /// Log filter, e.g. `info` or `ece_treasury=debug`
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn init_logging(cli_level: Option<&str>, config_level: &str) -> anyhow::Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config_level))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.server.data_dir = data_dir;
    }
    if let Some(storage) = cli.storage {
        config.server.storage = storage;
    }

    init_logging(cli.log_level.as_deref(), &config.server.log_level)?;
    config
        .treasury
        .apply_env()
        .context("reading environment overrides")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen,
        storage = ?config.server.storage,
        chain_mode = ?config.treasury.chain_mode,
        "starting ece-treasuryd"
    );

    let service = build_service(&config).await?;

    let served = ece_api::start_server(config.server.listen, service.api_state, shutdown_signal()).await;

    service.ledger.flush().await.context("flushing ledger")?;
    served.map_err(|e| anyhow::anyhow!("API server failed: {}", e))?;

    tracing::info!("ece-treasuryd stopped");
    Ok(())
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use energy_store::{MySqlReadingStore, ReadingStore};
use sqlx::mysql::MySqlPoolOptions;
use tauron_reader::{
    config::AppConfig,
    ledger::RunLedger,
    metrics_server, observability,
    pipeline::{Pipeline, PortalSettings, RunOptions, RunOutcome},
    status_server::{self, StatusState},
};

/// Fetch hourly meter readings from the Tauron portal into MySQL.
#[derive(Debug, Parser)]
#[command(name = "tauron-reader", version)]
struct Cli {
    /// Enable verbose (debug) output.
    #[arg(long)]
    verbose: bool,

    /// Fetch even if data was recently updated.
    #[arg(long)]
    force: bool,

    /// Port for the run status page; defaults to http.port from the config, then 8765.
    #[arg(long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Only run the HTTP status server, do not fetch data.
    #[arg(long)]
    serve_only: bool,

    /// Config file; defaults to $TAURON_CONFIG, then /data/options.json.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(cli.verbose);

    let cfg = AppConfig::load(cli.config.as_deref()).context("Error loading config")?;
    let schedule = cfg.schedule().context("Invalid schedule times")?;
    let table = cfg.table_name()?;
    if !cli.serve_only {
        cfg.validate_for_runs()?;
    }

    // Connections open on first use; every run pings the store before fetching.
    let pool = MySqlPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .acquire_timeout(cfg.request_timeout())
        .connect_lazy_with(cfg.database.connect_options());
    let store: Arc<dyn ReadingStore> = Arc::new(MySqlReadingStore::new(pool, table));

    let pipeline = Pipeline::new(
        store,
        PortalSettings::from_config(&cfg)?,
        RunLedger::in_dir(&cfg.storage.buffer_dir),
        cfg.storage.buffer_dir.clone(),
    );

    if cli.serve_only {
        let port = cli.http_port.unwrap_or_else(|| cfg.http_port());
        let metrics = match metrics_server::install() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder not installed");
                None
            }
        };
        let state = Arc::new(StatusState {
            schedule,
            pipeline: Arc::new(pipeline),
            metrics,
        });
        status_server::serve(port, state)
            .await
            .with_context(|| format!("status server on port {port}"))?;
        return Ok(());
    }

    // Skips exit 0; errors are already in the ledger and exit non-zero.
    let outcome = pipeline.run(RunOptions::scheduled(cli.force)).await?;
    if let RunOutcome::Completed { records } = outcome {
        tracing::info!(records, "data fetched and inserted successfully");
    }
    Ok(())
}

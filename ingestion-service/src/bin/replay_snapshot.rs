use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use energy_store::MySqlReadingStore;
use sqlx::mysql::MySqlPoolOptions;
use tauron_reader::{
    config::AppConfig,
    observability,
    sinks::{read_snapshot, write_batch},
};

/// Re-apply a `buffer_*.json` snapshot to the readings table.
///
/// Config is resolved like the main binary (`$TAURON_CONFIG`, then
/// `/data/options.json`).
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(false);

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: replay_snapshot <buffer_json_path>");
    }
    let path = PathBuf::from(&args[1]);

    let cfg = AppConfig::load(None)?;
    let table = cfg.table_name()?;

    let records = read_snapshot(&path).await?;
    tracing::info!(path = %path.display(), records = records.len(), "snapshot loaded");

    let pool = MySqlPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect_with(cfg.database.connect_options())
        .await
        .context("DB connect error")?;
    let store = Arc::new(MySqlReadingStore::new(pool, table));

    let written = write_batch(store.as_ref(), &records).await?;
    tracing::info!(records = written, table = %store.table(), "snapshot replayed");

    Ok(())
}

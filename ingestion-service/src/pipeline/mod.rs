use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{Local, Utc};
use energy_store::{ReadingStore, StoreError};

use crate::{
    config::AppConfig,
    ledger::{RunLedger, RunStatus},
    metrics_server,
    sinks::{write_batch, write_snapshot, WriteError},
    sources::{
        fetch_interval_csv, AuthError, FetchError, FetchWindow, PortalEndpoints, PortalSession,
    },
    throttle,
    transform::{self, SchemaError},
};

pub const SKIPPED_MESSAGE: &str = "recently updated";

/// Anything that ends a run early. `Display` is the ledger message.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("DB connect error: {0}")]
    Connect(#[source] StoreError),
    #[error("Login error: {0}")]
    Auth(#[from] AuthError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Parse error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Insert error: {source}")]
    Insert {
        records: usize,
        #[source]
        source: WriteError,
    },
    #[error("Buffer save error: {source}")]
    BufferSave {
        records: usize,
        #[source]
        source: WriteError,
    },
}

impl RunError {
    /// Record count written to the ledger: the batch size once one was parsed.
    pub fn records(&self) -> usize {
        match self {
            Self::Insert { records, .. } | Self::BufferSave { records, .. } => *records,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    fn success_message(self) -> &'static str {
        match self {
            Self::Scheduled => "ok",
            Self::Manual => "manual run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Bypass the freshness check.
    pub force: bool,
    pub trigger: Trigger,
}

impl RunOptions {
    pub fn scheduled(force: bool) -> Self {
        Self {
            force,
            trigger: Trigger::Scheduled,
        }
    }

    /// Manual runs always bypass the freshness check.
    pub fn manual() -> Self {
        Self {
            force: true,
            trigger: Trigger::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped,
    Completed { records: usize },
}

/// Portal location and credentials used to open a fresh session per run.
#[derive(Clone)]
pub struct PortalSettings {
    pub endpoints: PortalEndpoints,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl PortalSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AuthError> {
        Ok(Self {
            endpoints: PortalEndpoints::from_config(&cfg.tauron)?,
            username: cfg.tauron.username.clone(),
            password: cfg.tauron.password.clone(),
            timeout: cfg.request_timeout(),
        })
    }
}

impl std::fmt::Debug for PortalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalSettings")
            .field("endpoints", &self.endpoints)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One fetch cycle: freshness check, login, download, parse, upsert, snapshot.
///
/// Every call ends with exactly one ledger entry, whatever the outcome.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ReadingStore>,
    portal: PortalSettings,
    ledger: RunLedger,
    buffer_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        portal: PortalSettings,
        ledger: RunLedger,
        buffer_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            portal,
            ledger,
            buffer_dir: buffer_dir.into(),
        }
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub async fn run(&self, opts: RunOptions) -> Result<RunOutcome, RunError> {
        let started_at = Local::now().fixed_offset();
        let started = Instant::now();
        let result = self.execute(opts).await;
        let elapsed = started.elapsed();

        let (status, message, records) = match &result {
            Ok(RunOutcome::Skipped) => (RunStatus::Skipped, SKIPPED_MESSAGE.to_string(), 0),
            Ok(RunOutcome::Completed { records }) => (
                RunStatus::Success,
                opts.trigger.success_message().to_string(),
                *records,
            ),
            Err(e) => (RunStatus::Error, e.to_string(), e.records()),
        };

        match &result {
            Ok(_) => tracing::info!(
                %status,
                records,
                elapsed_ms = elapsed.as_millis() as u64,
                "run finished"
            ),
            Err(e) => tracing::error!(%status, records, error = %e, "run failed"),
        }
        metrics_server::record_run(status.as_str(), elapsed.as_secs_f64());

        let recorded = self
            .ledger
            .record(started_at, status, message, records, elapsed)
            .await;
        if let Err(e) = recorded {
            tracing::error!(error = %e, "failed to append run ledger entry");
        }
        result
    }

    async fn execute(&self, opts: RunOptions) -> Result<RunOutcome, RunError> {
        self.store.ping().await.map_err(RunError::Connect)?;
        tracing::debug!("connected to database");

        if !opts.force && throttle::check(self.store.as_ref(), Utc::now()).await {
            tracing::info!("data fetch skipped (recently updated)");
            return Ok(RunOutcome::Skipped);
        }

        let session = PortalSession::login(
            self.portal.endpoints.clone(),
            &self.portal.username,
            &self.portal.password,
            self.portal.timeout,
        )
        .await?;

        let payload = fetch_interval_csv(&session, FetchWindow::trailing(Utc::now())).await?;
        let records = transform::parse_export(&payload)?;
        tracing::info!(records = records.len(), "fetched interval readings");

        let total = records.len();
        write_batch(self.store.as_ref(), &records)
            .await
            .map_err(|source| RunError::Insert {
                records: total,
                source,
            })?;

        write_snapshot(&self.buffer_dir, &records, &Local::now())
            .await
            .map_err(|e| RunError::BufferSave {
                records: total,
                source: WriteError::from(e),
            })?;

        Ok(RunOutcome::Completed { records: total })
    }
}

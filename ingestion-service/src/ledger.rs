use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::transform::REFERENCE_TZ;

pub const LEDGER_FILE_NAME: &str = "runs.log.jsonl";
pub const DISPLAY_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("run ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode run record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the run ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub time: DateTime<FixedOffset>,
    pub status: RunStatus,
    pub message: String,
    pub records: usize,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

impl RunRecord {
    /// `started_at` is kept as the entry time, truncated to whole seconds.
    pub fn new(
        started_at: DateTime<FixedOffset>,
        status: RunStatus,
        message: impl Into<String>,
        records: usize,
        duration: Duration,
    ) -> Self {
        Self {
            time: started_at.with_nanosecond(0).unwrap_or(started_at),
            status,
            message: message.into(),
            records,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// `time` rendered in the reference timezone as `HH:MM:SS DD/MM/YYYY`.
    pub fn display_time(&self) -> String {
        self.time
            .with_timezone(&REFERENCE_TZ)
            .format(DISPLAY_FORMAT)
            .to_string()
    }
}

/// Append-only JSON-lines audit log of pipeline runs.
#[derive(Debug, Clone)]
pub struct RunLedger {
    path: PathBuf,
}

impl RunLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger kept next to the snapshots in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LEDGER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(
        &self,
        started_at: DateTime<FixedOffset>,
        status: RunStatus,
        message: impl Into<String>,
        records: usize,
        duration: Duration,
    ) -> Result<RunRecord, LedgerError> {
        let entry = RunRecord::new(started_at, status, message, records, duration);
        self.append(&entry).await?;
        Ok(entry)
    }

    /// Write `entry` as a single line in one append call.
    pub async fn append(&self, entry: &RunRecord) -> Result<(), LedgerError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        file.write_all(&line)
            .await
            .map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Up to `limit` most recent entries, oldest first.
    ///
    /// Lines that do not decode are skipped. A missing file reads as empty.
    pub async fn read_recent(&self, limit: usize) -> Result<Vec<RunRecord>, LedgerError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut recent: Vec<RunRecord> = contents
            .lines()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(limit)
            .collect();
        recent.reverse();
        Ok(recent)
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

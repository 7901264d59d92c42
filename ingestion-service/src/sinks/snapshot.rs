use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use energy_store::CanonicalRecord;

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `buffer_YYYY-MM-DD_HH-MM-SS.json`, second resolution in the given timezone.
pub fn snapshot_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("buffer_{}.json", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Write the batch as a pretty JSON array into `dir`, creating it if needed.
pub async fn write_snapshot<Tz: TimeZone>(
    dir: &Path,
    records: &[CanonicalRecord],
    at: &DateTime<Tz>,
) -> Result<PathBuf, SnapshotError>
where
    Tz::Offset: std::fmt::Display,
{
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SnapshotError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let path = dir.join(snapshot_file_name(at));
    let json = serde_json::to_vec_pretty(records).map_err(|source| SnapshotError::Json {
        path: path.clone(),
        source,
    })?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::info!(path = %path.display(), records = records.len(), "snapshot saved");
    Ok(path)
}

pub async fn read_snapshot(path: &Path) -> Result<Vec<CanonicalRecord>, SnapshotError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })
}

use chrono::NaiveDateTime;
use energy_store::{CanonicalRecord, ReadingStore, StoreError};

use super::snapshot::SnapshotError;
use crate::metrics_server;

const PROGRESS_EVERY: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("upsert of {ts} failed, {remaining} records not attempted: {source}")]
    Store {
        ts: NaiveDateTime,
        /// Records after the failing one; earlier records stay committed.
        remaining: usize,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Upsert `records` one by one in order, stopping at the first failure.
///
/// Each row is its own statement; there is no batch transaction.
pub async fn write_batch(
    store: &dyn ReadingStore,
    records: &[CanonicalRecord],
) -> Result<usize, WriteError> {
    let total = records.len();
    for (i, record) in records.iter().enumerate() {
        if let Err(source) = store.upsert_reading(record).await {
            metrics_server::record_upserted(i as u64);
            return Err(WriteError::Store {
                ts: record.ts_real(),
                remaining: total - i - 1,
                source,
            });
        }
        if (i + 1) % PROGRESS_EVERY == 0 {
            tracing::debug!(inserted = i + 1, total, "upsert progress");
        }
    }

    metrics_server::record_upserted(total as u64);
    tracing::debug!(records = total, "all records upserted");
    Ok(total)
}

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::NaiveDateTime;

use super::{ReadingStore, StoreError};
use crate::domain::CanonicalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredReading {
    pub consumption_wh: u32,
    pub production_wh: u32,
}

/// Process-local readings table with the same upsert semantics as MySQL.
///
/// Failures can be injected to exercise the fail-open throttle and partial
/// batch writes.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    rows: Mutex<BTreeMap<NaiveDateTime, StoredReading>>,
    upserts: Mutex<usize>,
    fail_upsert_at: Option<usize>,
    fail_latest: bool,
    unreachable: bool,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `n`-th upsert call (zero-based, counted over the store lifetime) fails.
    pub fn failing_upsert_at(mut self, n: usize) -> Self {
        self.fail_upsert_at = Some(n);
        self
    }

    /// Every call fails as if the database were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn failing_latest(mut self) -> Self {
        self.fail_latest = true;
        self
    }

    pub fn with_row(self, ts: NaiveDateTime, consumption_wh: u32, production_wh: u32) -> Self {
        self.lock_rows().insert(
            ts,
            StoredReading {
                consumption_wh,
                production_wh,
            },
        );
        self
    }

    pub fn rows(&self) -> BTreeMap<NaiveDateTime, StoredReading> {
        self.lock_rows().clone()
    }

    pub fn upsert_calls(&self) -> usize {
        *self.upserts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, BTreeMap<NaiveDateTime, StoredReading>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.unreachable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn latest_timestamp(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        if self.fail_latest || self.unreachable {
            return Err(StoreError::Unavailable("latest timestamp query failed".into()));
        }
        Ok(self.lock_rows().keys().next_back().copied())
    }

    async fn upsert_reading(&self, reading: &CanonicalRecord) -> Result<(), StoreError> {
        let call = {
            let mut upserts = self.upserts.lock().unwrap_or_else(|e| e.into_inner());
            let call = *upserts;
            *upserts += 1;
            call
        };
        if self.unreachable || self.fail_upsert_at == Some(call) {
            return Err(StoreError::Unavailable(format!(
                "upsert of {} rejected",
                reading.ts_real()
            )));
        }

        self.lock_rows().insert(
            reading.ts_real(),
            StoredReading {
                consumption_wh: reading.consumption_wh,
                production_wh: reading.production_wh,
            },
        );
        Ok(())
    }
}

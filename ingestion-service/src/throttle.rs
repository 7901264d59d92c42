use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use energy_store::ReadingStore;

/// How recent the newest stored reading may be before a fetch is skipped.
pub fn freshness_window() -> TimeDelta {
    TimeDelta::hours(1)
}

/// Pure freshness check.
///
/// `latest` is the stored `ts_real` taken at face value as UTC, with no
/// timezone conversion.
pub fn should_skip(latest: Option<NaiveDateTime>, now: DateTime<Utc>) -> bool {
    match latest {
        Some(latest) => latest.and_utc() > now - freshness_window(),
        None => false,
    }
}

/// Ask the store whether the last run is recent enough to skip this one.
///
/// Fails open: an empty table or a failed query means the run proceeds.
pub async fn check(store: &dyn ReadingStore, now: DateTime<Utc>) -> bool {
    match store.latest_timestamp().await {
        Ok(None) => {
            tracing::debug!("no stored readings, proceeding with fetch");
            false
        }
        Ok(Some(latest)) => {
            let skip = should_skip(Some(latest), now);
            if skip {
                tracing::debug!(%latest, "latest reading is within the last hour");
            } else {
                tracing::debug!(%latest, "latest reading is stale, proceeding with fetch");
            }
            skip
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not check latest reading, proceeding with fetch");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use energy_store::MemoryReadingStore;

    fn naive(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        naive(h, m).and_utc()
    }

    #[test]
    fn skips_only_when_newer_than_an_hour_ago() {
        assert!(should_skip(Some(naive(11, 30)), utc(12, 0)));
        assert!(!should_skip(Some(naive(11, 0)), utc(12, 0)));
        assert!(!should_skip(Some(naive(9, 59)), utc(12, 0)));
        assert!(!should_skip(None, utc(12, 0)));
    }

    #[test]
    fn stored_value_is_compared_without_conversion() {
        // A Warsaw wall-clock of 12:59 read as UTC is still "in the future" at 12:30 UTC.
        assert!(should_skip(Some(naive(12, 59)), utc(12, 30)));
    }

    #[tokio::test]
    async fn empty_store_proceeds() {
        let store = MemoryReadingStore::new();
        assert!(!check(&store, utc(12, 0)).await);
    }

    #[tokio::test]
    async fn fresh_store_skips() {
        let store = MemoryReadingStore::new().with_row(naive(11, 59), 100, 0);
        assert!(check(&store, utc(12, 0)).await);
    }

    #[tokio::test]
    async fn query_failure_fails_open() {
        let store = MemoryReadingStore::new()
            .with_row(naive(11, 59), 100, 0)
            .failing_latest();
        assert!(!check(&store, utc(12, 0)).await);
    }
}

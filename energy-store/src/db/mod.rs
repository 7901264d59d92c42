mod memory;
mod reading_queries;

use std::fmt;

use chrono::NaiveDateTime;

use crate::domain::CanonicalRecord;

pub use memory::{MemoryReadingStore, StoredReading};
pub use reading_queries::MySqlReadingStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for hourly readings keyed by their `ts_real` timestamp.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Check that the backing database can be reached.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Largest stored `ts_real`, or `None` for an empty table.
    async fn latest_timestamp(&self) -> Result<Option<NaiveDateTime>, StoreError>;

    /// Insert the reading, or overwrite the row that already has its timestamp.
    async fn upsert_reading(&self, reading: &CanonicalRecord) -> Result<(), StoreError>;
}

/// Table identifier checked once at startup, since it is interpolated into SQL.
///
/// Accepts `table` or `schema.table`, each part made of ASCII letters, digits and `_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        let trimmed = name.trim();
        let valid = !trimmed.is_empty()
            && trimmed.split('.').count() <= 2
            && trimmed.split('.').all(|part| {
                !part.is_empty()
                    && part.len() <= 64
                    && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(StoreError::InvalidTableName(name));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for MySQL statements.
    pub fn quoted(&self) -> String {
        self.0
            .split('.')
            .map(|part| format!("`{part}`"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub mod db;
pub mod domain;

pub use db::{MemoryReadingStore, MySqlReadingStore, ReadingStore, StoreError, StoredReading, TableName};
pub use domain::CanonicalRecord;

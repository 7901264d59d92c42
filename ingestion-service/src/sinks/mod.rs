pub mod reading_upsert;
pub mod snapshot;

pub use reading_upsert::{write_batch, WriteError};
pub use snapshot::{read_snapshot, write_snapshot, SnapshotError};

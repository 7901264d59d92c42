pub mod config;
pub mod ledger;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod status_server;
pub mod throttle;
pub mod transform;

pub use pipeline::{Pipeline, RunError, RunOptions, RunOutcome};

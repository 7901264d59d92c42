pub mod interval_csv;
pub mod portal_session;

pub use interval_csv::{fetch_interval_csv, FetchError, FetchWindow};
pub use portal_session::{AuthError, PortalEndpoints, PortalSession};

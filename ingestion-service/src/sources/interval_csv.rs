use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};

use super::portal_session::PortalSession;
use crate::transform::REFERENCE_TZ;

const DATA_PATH: &str = "/energia/do/dane";
const FETCH_USER_AGENT: &str = "PostmanRuntime/7.29.2";
/// Calendar days before today included in every download.
pub const TRAILING_DAYS: u64 = 3;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("fetch failed with status {0}")]
    Status(u16),
}

/// Inclusive date range requested from the portal, in the reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl FetchWindow {
    /// Today in Europe/Warsaw and the [`TRAILING_DAYS`] calendar days before it.
    pub fn trailing(now: DateTime<Utc>) -> Self {
        let today = now.with_timezone(&REFERENCE_TZ).date_naive();
        let from = today.checked_sub_days(Days::new(TRAILING_DAYS)).unwrap_or(today);
        Self { from, to: today }
    }

    fn query(&self) -> String {
        format!(
            "form[from]={}&form[to]={}&form[type]=godzin&form[energy][netto]=1&form[energy][netto_oze]=1&form[fileType]=CSV",
            self.from.format("%d.%m.%Y"),
            self.to.format("%d.%m.%Y"),
        )
    }
}

/// Download hourly net consumption and production for `window` as CSV text.
///
/// The export is not always valid UTF-8, so invalid bytes are replaced rather
/// than rejected; header matching tolerates the damage.
pub async fn fetch_interval_csv(
    session: &PortalSession,
    window: FetchWindow,
) -> Result<String, FetchError> {
    let service = session.endpoints().service_url.as_str().trim_end_matches('/');
    let url = format!("{service}{DATA_PATH}?{}", window.query());
    tracing::debug!(from = %window.from, to = %window.to, "requesting interval export");

    let resp = session
        .client()
        .get(url)
        .header(USER_AGENT, FETCH_USER_AGENT)
        .header(ACCEPT, "*/*")
        .send()
        .await?;

    let status = resp.status().as_u16();
    if status != 200 {
        return Err(FetchError::Status(status));
    }

    let body = resp.bytes().await?;
    tracing::debug!(bytes = body.len(), "interval export downloaded");
    Ok(String::from_utf8_lossy(&body).into_owned())
}

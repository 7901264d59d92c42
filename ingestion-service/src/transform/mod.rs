mod timestamp;

use std::collections::HashMap;

use chrono_tz::Tz;
use csv::StringRecord;
use energy_store::CanonicalRecord;

use crate::metrics_server;

pub use timestamp::normalize_timestamp;

/// Timezone the portal reports in and the status views display in.
pub const REFERENCE_TZ: Tz = chrono_tz::Europe::Warsaw;

const TIMESTAMP_COLUMN: &str = "Data";
const KIND_COLUMN: &str = "Rodzaj";
const CONSUMPTION_KIND: &str = "pobrana po zbilansowaniu";
const PRODUCTION_KIND: &str = "oddana po zbilansowaniu";

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("empty CSV payload")]
    Empty,
    #[error("could not find value column in CSV")]
    MissingValueColumn,
    #[error("could not find '{0}' column in CSV")]
    MissingColumn(&'static str),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Consumption,
    Production,
}

impl RowKind {
    fn from_category(category: &str) -> Option<Self> {
        match category {
            CONSUMPTION_KIND => Some(Self::Consumption),
            PRODUCTION_KIND => Some(Self::Production),
            _ => None,
        }
    }
}

/// One relevant CSV line, cells trimmed but otherwise untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub kind: RowKind,
    pub timestamp: String,
    pub value: String,
}

/// Column positions resolved once from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub timestamp: usize,
    pub kind: usize,
    pub value: usize,
}

impl ColumnMap {
    /// The value column is the first header containing both `warto` and `kwh`
    /// (case-insensitive), which survives a mangled `Wartość kWh`.
    pub fn resolve(headers: &StringRecord) -> Result<Self, SchemaError> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let value = names
            .iter()
            .position(|h| {
                let lower = h.to_lowercase();
                lower.contains("warto") && lower.contains("kwh")
            })
            .ok_or(SchemaError::MissingValueColumn)?;
        let timestamp = names
            .iter()
            .position(|h| h == TIMESTAMP_COLUMN)
            .ok_or(SchemaError::MissingColumn(TIMESTAMP_COLUMN))?;
        let kind = names
            .iter()
            .position(|h| h == KIND_COLUMN)
            .ok_or(SchemaError::MissingColumn(KIND_COLUMN))?;

        Ok(Self {
            timestamp,
            kind,
            value,
        })
    }

    fn raw_row(&self, record: &StringRecord) -> Option<RawRow> {
        let kind = RowKind::from_category(record.get(self.kind)?.trim())?;
        Some(RawRow {
            kind,
            timestamp: record.get(self.timestamp)?.trim().to_string(),
            value: record.get(self.value)?.trim().to_string(),
        })
    }
}

/// Read the whole export into typed rows, keeping input order.
///
/// Rows of other categories and rows too short to reach a needed column are
/// skipped.
pub fn parse_rows(payload: &str) -> Result<Vec<RawRow>, SchemaError> {
    if payload.trim().is_empty() {
        return Err(SchemaError::Empty);
    }

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .has_headers(true)
        .from_reader(payload.as_bytes());
    let columns = ColumnMap::resolve(rdr.headers()?)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if let Some(row) = columns.raw_row(&record) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Decimal kWh with either separator, to whole Wh rounded half away from zero.
///
/// Negative, non-finite and out-of-range values count as unparseable.
pub fn kwh_to_wh(raw: &str) -> Option<u32> {
    let kwh: f64 = raw.trim().replace(',', ".").parse().ok()?;
    let wh = (kwh * 1000.0).round();
    if !wh.is_finite() || wh < 0.0 || wh > f64::from(u32::MAX) {
        return None;
    }
    Some(wh as u32)
}

/// Pair every consumption row with the first production row that has the same
/// raw timestamp and build canonical records in consumption order.
///
/// Consumption rows with an unparseable value or timestamp are dropped. A
/// missing or unparseable production value becomes 0 Wh.
pub fn reconcile(rows: &[RawRow]) -> Vec<CanonicalRecord> {
    let mut production: HashMap<&str, &str> = HashMap::new();
    for row in rows.iter().filter(|r| r.kind == RowKind::Production) {
        production
            .entry(row.timestamp.as_str())
            .or_insert(row.value.as_str());
    }

    let mut records = Vec::new();
    for row in rows.iter().filter(|r| r.kind == RowKind::Consumption) {
        let Some(consumption_wh) = kwh_to_wh(&row.value) else {
            tracing::debug!(
                ts = %row.timestamp,
                value = %row.value,
                "dropping row with unparseable consumption"
            );
            metrics_server::record_dropped_row("value");
            continue;
        };
        let Some(timestamp) = normalize_timestamp(&row.timestamp) else {
            tracing::debug!(ts = %row.timestamp, "dropping row with unparseable timestamp");
            metrics_server::record_dropped_row("timestamp");
            continue;
        };
        let production_wh = production
            .get(row.timestamp.as_str())
            .and_then(|v| kwh_to_wh(v))
            .unwrap_or(0);

        records.push(CanonicalRecord {
            timestamp,
            consumption_wh,
            production_wh,
        });
    }
    records
}

/// [`parse_rows`] followed by [`reconcile`].
pub fn parse_export(payload: &str) -> Result<Vec<CanonicalRecord>, SchemaError> {
    let rows = parse_rows(payload)?;
    let records = reconcile(&rows);
    tracing::debug!(rows = rows.len(), records = records.len(), "export parsed");
    Ok(records)
}

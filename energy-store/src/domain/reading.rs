use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One reconciled hourly reading, ready to be written to the readings table.
///
/// `timestamp` carries the reference-timezone offset it was resolved with, so a
/// snapshot can be replayed on a host with a different local timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub consumption_wh: u32,
    pub production_wh: u32,
}

impl CanonicalRecord {
    /// Wall-clock value stored in the `ts_real` key column.
    pub fn ts_real(&self) -> NaiveDateTime {
        self.timestamp.naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_real_keeps_reference_wall_clock() {
        let record = CanonicalRecord {
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T00:59:00+01:00").unwrap(),
            consumption_wh: 1100,
            production_wh: 653,
        };

        assert_eq!(record.ts_real().to_string(), "2024-03-01 00:59:00");
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let record = CanonicalRecord {
            timestamp: DateTime::parse_from_rfc3339("2024-07-01T12:59:00+02:00").unwrap(),
            consumption_wh: 0,
            production_wh: 2405,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["consumptionWh"], 0);
        assert_eq!(json["productionWh"], 2405);
        assert_eq!(json["timestamp"], "2024-07-01T12:59:00+02:00");
    }
}

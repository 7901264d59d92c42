use chrono::{
    format::ParseErrorKind, DateTime, Days, FixedOffset, LocalResult, NaiveDateTime, TimeDelta,
    TimeZone,
};

use super::REFERENCE_TZ;

const PORTAL_FORMAT: &str = "%Y-%m-%d %H:%M";
const END_OF_DAY: &str = " 24:00";

/// Turn a portal interval label into the canonical timestamp.
///
/// The portal labels an hour by its end, so `2024-03-01 1:00` covers 00:00-01:00
/// and becomes `2024-03-01T00:59:00+01:00`. `24:00` is read as midnight of the
/// next day. Returns `None` for anything else that does not parse.
pub fn normalize_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let local = parse_wall_clock(raw.trim())?;
    let instant = resolve_local(local)?;
    let shifted = instant - TimeDelta::minutes(1);
    Some(shifted.with_timezone(&REFERENCE_TZ).fixed_offset())
}

fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(raw, PORTAL_FORMAT) {
        Ok(ts) => Some(ts),
        Err(e) if e.kind() == ParseErrorKind::OutOfRange && raw.contains(END_OF_DAY) => {
            let midnight = raw.replacen(END_OF_DAY, " 00:00", 1);
            NaiveDateTime::parse_from_str(&midnight, PORTAL_FORMAT)
                .ok()?
                .checked_add_days(Days::new(1))
        }
        Err(_) => None,
    }
}

/// Ambiguous wall-clock times (autumn fold) take the earlier instant; times in
/// the spring gap move forward by an hour.
fn resolve_local(local: NaiveDateTime) -> Option<DateTime<chrono_tz::Tz>> {
    match REFERENCE_TZ.from_local_datetime(&local) {
        LocalResult::Single(ts) => Some(ts),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => REFERENCE_TZ
            .from_local_datetime(&(local + TimeDelta::hours(1)))
            .earliest(),
    }
}

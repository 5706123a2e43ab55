use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Parse a caller-supplied instant.
///
/// Accepts a bare calendar day (midnight), a naive local timestamp with `T`
/// or space separator, or RFC 3339 (converted to local wall-clock time).
pub fn parse_instant(field: &str, raw: &str) -> CoreResult<NaiveDateTime> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(CoreError::validation(format!("{field} must not be empty")));
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(v);
        }
    }
    if let Ok(v) = DateTime::parse_from_rfc3339(t) {
        return Ok(v.with_timezone(&Local).naive_local());
    }
    Err(CoreError::validation(format!(
        "{field} must be YYYY-MM-DD, a local timestamp or RFC 3339"
    )))
}

pub fn parse_optional_instant(field: &str, raw: Option<&str>) -> CoreResult<Option<NaiveDateTime>> {
    raw.map(|v| parse_instant(field, v)).transpose()
}

pub fn parse_day(field: &str, raw: &str) -> CoreResult<NaiveDate> {
    parse_instant(field, raw).map(|v| v.date())
}

/// `YYYY-MM-DD` key used by the attendance uniqueness index.
pub fn day_key(at: &NaiveDateTime) -> String {
    day_key_of(at.date())
}

/// `YYYY-MM` key used by the fee uniqueness index.
pub fn month_key(at: &NaiveDateTime) -> String {
    at.format("%Y-%m").to_string()
}

pub fn check_month(month: u32) -> CoreResult<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(CoreError::validation("month must be between 1 and 12"))
    }
}

/// `YYYY-MM-DD` key of a calendar day.
pub fn day_key_of(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn last_day_of_month(year: i32, month: u32) -> CoreResult<NaiveDate> {
    check_month(month)?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| CoreError::validation(format!("year out of range: {year}")))
}

/// First and last day keys of a calendar month, both inclusive.
///
/// Range queries run on the stored `day` key, so every instant of the last
/// day matches whatever its sub-second precision.
pub fn month_day_range(year: i32, month: u32) -> CoreResult<(String, String)> {
    let last = last_day_of_month(year, month)?;
    let first = last.with_day(1).unwrap_or(last);
    Ok((day_key_of(first), day_key_of(last)))
}

/// Midnight at the start of `now`'s calendar day.
pub fn start_of_day(now: &NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN)
}

pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

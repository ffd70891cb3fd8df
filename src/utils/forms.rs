use chrono::{NaiveDate, NaiveTime};

use crate::models::Money;

/// Trimmed value, or `None` when the field was left blank.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn parse_id(value: Option<&str>) -> Result<Option<i64>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or_else(|| format!("'{}' is not a valid identifier", s)),
    }
}

pub fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("'{}' is not a date (expected YYYY-MM-DD)", s)),
    }
}

/// Accepts both "HH:MM" from time inputs and "HH:MM:SS".
pub fn parse_time(value: Option<&str>) -> Result<Option<NaiveTime>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => NaiveTime::parse_from_str(&s, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
            .map(Some)
            .map_err(|_| format!("'{}' is not a time (expected HH:MM)", s)),
    }
}

pub fn parse_money(value: Option<&str>) -> Result<Option<Money>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => s
            .parse::<Money>()
            .map(Some)
            .map_err(|_| format!("'{}' is not an amount", s)),
    }
}

/// HTML checkboxes send "on" or nothing at all.
pub fn checkbox(value: Option<&str>) -> bool {
    matches!(
        value.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("on") | Some("1") | Some("true") | Some("yes")
    )
}

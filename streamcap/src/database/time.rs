//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `TEXT` in `%Y-%m-%d %H:%M:%S` local time, the
//! same shape SQLite's `DATETIME('now', 'localtime')` produces, so rows
//! written from Rust and rows defaulted by the schema compare correctly.

use chrono::{Local, NaiveDateTime};

/// Storage format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in storage format.
pub fn now_string() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Current local date (`%Y-%m-%d`), used for block dates.
pub fn today_string() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let now = now_string();
        assert!(parse_timestamp(&now).is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("not a time").is_none());
        assert!(parse_timestamp("2024-13-40 99:99:99").is_none());
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn timestamp_to_datetime(timestamp_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(Utc::now)
}

pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// RFC 3339 / ISO-8601 in UTC with millisecond precision and a `Z` suffix.
pub fn format_iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso8601() -> String {
    format_iso8601(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso8601_round_trip() {
        let dt = timestamp_to_datetime(1_700_000_000_123);
        let formatted = format_iso8601(dt);
        assert_eq!(formatted, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_iso8601(&formatted).unwrap(), dt);
    }

    #[test]
    fn test_now_is_utc() {
        assert!(now_iso8601().ends_with('Z'));
        assert!(now_timestamp_ms() > 1_600_000_000_000);
    }
}

//! Wall-clock ISO-8601 UTC timestamp helpers (spec §5: "Event timestamps
//! are wall-clock ISO-8601 in UTC and are only used for ordering within the
//! same writer").

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current UTC time.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current UTC time rendered as a canonical ISO-8601 string with
/// a `Z` suffix, matching the original implementation's `utc_now_iso()`.
pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 string, accepting a trailing `Z` in place of `+00:00`.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_timestamp_round_trips() {
        let s = utc_now_iso();
        assert!(parse_iso8601(&s).is_ok());
    }

    #[test]
    fn rejects_non_iso_strings() {
        assert!(parse_iso8601("not a date").is_err());
    }
}

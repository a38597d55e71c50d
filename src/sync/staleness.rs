//! Freshness policy for cached records
//!
//! Every cached record carries a `stored_at` timestamp written in UTC. A
//! record is fresh for a fixed threshold after that instant.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};

/// Format an instant the way the store persists `stored_at`
pub fn format_stored_at(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a persisted `stored_at` value
///
/// Accepts RFC 3339 with any offset, or a naive ISO-8601 date-time which is
/// taken to be UTC.
pub fn parse_stored_at(stored_at: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(stored_at) {
        return Some(instant.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stored_at, format).ok())
        .map(|naive| naive.and_utc())
}

/// Whether a record stored at `stored_at` has outlived `threshold` at `now`
///
/// Stale iff `stored_at + threshold < now`. Unparseable timestamps are stale.
pub fn is_stale(stored_at: &str, threshold: Duration, now: DateTime<Utc>) -> bool {
    match parse_stored_at(stored_at) {
        Some(instant) => instant
            .checked_add_signed(threshold)
            .is_some_and(|expires| expires < now),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 21, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_twenty_minutes_old_is_stale_at_fifteen() {
        let stored_at = format_stored_at(now() - Duration::minutes(20));
        assert!(is_stale(&stored_at, Duration::minutes(15), now()));
    }

    #[test]
    fn test_ten_minutes_old_is_fresh_at_fifteen() {
        let stored_at = format_stored_at(now() - Duration::minutes(10));
        assert!(!is_stale(&stored_at, Duration::minutes(15), now()));
    }

    #[test]
    fn test_exact_threshold_is_still_fresh() {
        let stored_at = format_stored_at(now() - Duration::minutes(5));
        assert!(!is_stale(&stored_at, Duration::minutes(5), now()));

        let stored_at = format_stored_at(now() - Duration::minutes(5) - Duration::milliseconds(1));
        assert!(is_stale(&stored_at, Duration::minutes(5), now()));
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        // 14:55 at +03:00 is 11:55 UTC
        assert!(!is_stale(
            "2024-05-21T14:55:00+03:00",
            Duration::minutes(15),
            now()
        ));
        assert!(is_stale(
            "2024-05-21T14:55:00+03:00",
            Duration::minutes(4),
            now()
        ));
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        assert_eq!(
            parse_stored_at("2024-05-21T11:50:00.250"),
            Some(Utc.with_ymd_and_hms(2024, 5, 21, 11, 50, 0).unwrap() + Duration::milliseconds(250))
        );
        assert!(!is_stale("2024-05-21T11:50", Duration::minutes(15), now()));
    }

    #[test]
    fn test_garbage_is_stale() {
        assert!(is_stale("", Duration::minutes(15), now()));
        assert!(is_stale("yesterday", Duration::minutes(15), now()));
    }

    #[test]
    fn test_format_roundtrips_through_parse() {
        let stamp = format_stored_at(now());
        assert_eq!(stamp, "2024-05-21T12:00:00.000Z");
        assert_eq!(parse_stored_at(&stamp), Some(now()));
    }
}

//! Timestamp parsing and rendering.
//!
//! Everything downstream compares naive local times. Values carrying an
//! offset are converted to local time first and the zone is dropped.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

/// Display format stored in records (`2025-10-10 09:00:00`).
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO format stored in records (`2025-10-10T09:00:00`).
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Compact format used by conversation outlines.
pub const OUTLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

const NAIVE_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse the assorted textual date formats the store produces.
///
/// Returns `None` for empty or unrecognised input.
pub fn parse_datetime_string(value: &str) -> Option<NaiveDateTime> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }

    // Covers `Z` as well as numeric offsets.
    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Some(zoned.with_timezone(&Local).naive_local());
    }

    parse_naive(text).or_else(|| {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_parse_iso_and_display() {
        assert_eq!(
            parse_datetime_string("2025-10-10T09:00:00"),
            Some(at(2025, 10, 10, 9, 0, 0))
        );
        assert_eq!(
            parse_datetime_string("2025-10-10 09:00:00"),
            Some(at(2025, 10, 10, 9, 0, 0))
        );
        assert_eq!(
            parse_datetime_string("2025-10-11 11:30"),
            Some(at(2025, 10, 11, 11, 30, 0))
        );
    }

    #[test]
    fn test_parse_european_and_date_only() {
        assert_eq!(
            parse_datetime_string("10/10/2025 09:15"),
            Some(at(2025, 10, 10, 9, 15, 0))
        );
        assert_eq!(
            parse_datetime_string("2025-10-10"),
            Some(at(2025, 10, 10, 0, 0, 0))
        );
    }

    #[test]
    fn test_parse_utc_suffix_converts_to_local() {
        let expected = at(2025, 10, 10, 9, 0, 0)
            .and_utc()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parse_datetime_string("2025-10-10T09:00:00Z"), Some(expected));
        assert_eq!(
            parse_datetime_string("2025-10-10T11:00:00+02:00"),
            Some(expected)
        );
        let fractional = parse_datetime_string("2025-10-10T09:00:00.250Z").unwrap();
        assert_eq!(fractional.and_utc().timestamp(), expected.and_utc().timestamp());
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_datetime_string(""), None);
        assert_eq!(parse_datetime_string("   "), None);
        assert_eq!(parse_datetime_string("not a date"), None);
    }
}

//! Watermark model
//!
//! Every timestamp-like value the engine persists is normalized to a single
//! comparable form: UTC, second precision, `YYYY-MM-DDTHH:MM:SSZ`. Vendor
//! cursors that do not look like timestamps pass through untouched.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical output format
const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Naive layouts tried after RFC 3339; interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset-carrying layouts that RFC 3339 parsing rejects
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// A timestamp in any of the shapes vendors hand us
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampValue<'a> {
    Instant(DateTime<Utc>),
    Epoch(i64),
    EpochFloat(f64),
    Text(&'a str),
}

impl<Tz: TimeZone> From<DateTime<Tz>> for TimestampValue<'_> {
    fn from(dt: DateTime<Tz>) -> Self {
        TimestampValue::Instant(dt.with_timezone(&Utc))
    }
}

impl From<i64> for TimestampValue<'_> {
    fn from(secs: i64) -> Self {
        TimestampValue::Epoch(secs)
    }
}

impl From<f64> for TimestampValue<'_> {
    fn from(secs: f64) -> Self {
        TimestampValue::EpochFloat(secs)
    }
}

impl<'a> From<&'a str> for TimestampValue<'a> {
    fn from(s: &'a str) -> Self {
        TimestampValue::Text(s)
    }
}

impl<'a> From<&'a String> for TimestampValue<'a> {
    fn from(s: &'a String) -> Self {
        TimestampValue::Text(s.as_str())
    }
}

/// Format an instant in canonical form
pub fn format_canonical(dt: DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// Current time in canonical form
pub fn utc_now_canonical() -> String {
    format_canonical(Utc::now())
}

/// Convert a value to an instant, or `None` when it is not timestamp-shaped
pub fn to_instant<'a>(value: impl Into<TimestampValue<'a>>) -> Option<DateTime<Utc>> {
    match value.into() {
        TimestampValue::Instant(dt) => Some(dt),
        TimestampValue::Epoch(secs) => Utc.timestamp_opt(secs, 0).single(),
        TimestampValue::EpochFloat(secs) => {
            if !secs.is_finite() {
                return None;
            }
            Utc.timestamp_opt(secs.floor() as i64, 0).single()
        }
        TimestampValue::Text(s) => parse_timestamp(s),
    }
}

/// Canonical form of a value, or `None` when it cannot be parsed
pub fn canonicalize<'a>(value: impl Into<TimestampValue<'a>>) -> Option<String> {
    to_instant(value).map(format_canonical)
}

/// Canonical form of a value; unparseable input is returned verbatim
pub fn normalize<'a>(value: impl Into<TimestampValue<'a>>) -> String {
    let value = value.into();
    if let Some(dt) = to_instant(value.clone()) {
        return format_canonical(dt);
    }
    match value {
        TimestampValue::Text(s) => s.to_string(),
        TimestampValue::Epoch(secs) => secs.to_string(),
        TimestampValue::EpochFloat(secs) => secs.to_string(),
        TimestampValue::Instant(dt) => format_canonical(dt),
    }
}

/// Parse a timestamp string: `YYYY-MM-DD`, epoch digits, or ISO-8601-ish text
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-' {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // chrono's RFC 3339 parser wants an upper-case `Z`
    if let Some(stripped) = s.strip_suffix('z').or_else(|| s.strip_suffix('Z')) {
        if let Some(dt) = parse_naive(stripped) {
            return Some(dt);
        }
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    parse_naive(s)
}

fn parse_naive(s: &str) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Unix epoch seconds for a timestamp string
pub fn to_epoch_seconds(raw: &str) -> Option<i64> {
    parse_timestamp(raw).map(|dt| dt.timestamp())
}

/// The later of two timestamps.
///
/// A missing side yields the other; when either side fails to parse the
/// first argument wins.
pub fn max_timestamp(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (Some(a), Some(b)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(da), Some(db)) if db > da => Some(b.to_string()),
            _ => Some(a.to_string()),
        },
    }
}

/// Trailing slice re-fetched before the watermark to catch late edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlap {
    Days(i64),
    Seconds(i64),
}

impl Overlap {
    /// Negative values count as zero; `None` when out of range
    pub fn as_duration(&self) -> Option<Duration> {
        match *self {
            Overlap::Days(d) => Duration::try_days(d.max(0)),
            Overlap::Seconds(s) => Duration::try_seconds(s.max(0)),
        }
    }
}

impl Default for Overlap {
    fn default() -> Self {
        Overlap::Days(7)
    }
}

/// Half-open fetch range `[start, end)` for one incremental pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn start_canonical(&self) -> String {
        format_canonical(self.start)
    }

    pub fn end_canonical(&self) -> String {
        format_canonical(self.end)
    }

    /// Start date as `YYYY-MM-DD`, for day-granular vendor APIs
    pub fn start_date(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Compute the window for the next fetch.
///
/// With a parseable watermark the window starts `overlap` before it; with no
/// watermark (or an opaque one) it starts at `start_boundary`, as it does
/// when the overlap reaches past the representable range. The start never
/// passes `now`.
pub fn fetch_window(
    watermark: Option<&str>,
    overlap: Overlap,
    start_boundary: DateTime<Utc>,
    now: DateTime<Utc>,
) -> FetchWindow {
    let start = watermark
        .and_then(parse_timestamp)
        .and_then(|wm| wm.checked_sub_signed(overlap.as_duration()?))
        .unwrap_or(start_boundary);

    FetchWindow {
        start: start.min(now),
        end: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_epoch() {
        assert_eq!(normalize(1770715852_i64), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("1770715852"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize(1770715852.9_f64), "2026-02-10T09:30:52Z");
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize("2026-02-10"), "2026-02-10T00:00:00Z");
        assert_eq!(normalize("2026-02-11"), "2026-02-11T00:00:00Z");
    }

    #[test]
    fn test_normalize_iso_variants() {
        assert_eq!(normalize("2026-02-10T09:30:52Z"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("2026-02-10T09:30:52.123Z"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("2026-02-10T10:30:52+01:00"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("2026-02-10T10:30:52+0100"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("2026-02-10T09:30:52"), "2026-02-10T09:30:52Z");
        assert_eq!(normalize("2026-02-10 09:30:52"), "2026-02-10T09:30:52Z");
    }

    #[test]
    fn test_normalize_instant() {
        let dt = DateTime::parse_from_rfc3339("2026-02-10T04:30:52-05:00").unwrap();
        assert_eq!(normalize(dt), "2026-02-10T09:30:52Z");
    }

    #[test]
    fn test_unparseable_passes_through() {
        assert_eq!(normalize("cursor:abc123"), "cursor:abc123");
        assert_eq!(canonicalize("cursor:abc123"), None);
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_to_epoch_seconds() {
        assert_eq!(to_epoch_seconds("1770715852"), Some(1770715852));
        assert_eq!(to_epoch_seconds("2026-02-10T09:30:52Z"), Some(1770715852));
        assert_eq!(to_epoch_seconds("2026-02-10"), Some(1770681600));
        assert_eq!(to_epoch_seconds("nope"), None);
    }

    #[test]
    fn test_max_timestamp() {
        assert_eq!(
            max_timestamp(Some("2026-02-10T00:00:00Z"), Some("2026-02-11T00:00:00Z")),
            Some("2026-02-11T00:00:00Z".to_string())
        );
        assert_eq!(
            max_timestamp(Some("2026-02-12T00:00:00Z"), Some("2026-02-11T00:00:00Z")),
            Some("2026-02-12T00:00:00Z".to_string())
        );
        assert_eq!(max_timestamp(None, Some("x")), Some("x".to_string()));
        assert_eq!(max_timestamp(Some("bad"), Some("2026-02-11")), Some("bad".to_string()));
        assert_eq!(max_timestamp(None, None), None);
    }

    #[test]
    fn test_fetch_window_with_watermark() {
        let now = parse_timestamp("2026-02-20T00:00:00Z").unwrap();
        let boundary = parse_timestamp("2010-01-01").unwrap();

        let window = fetch_window(Some("2026-02-18T12:00:00Z"), Overlap::Days(7), boundary, now);
        assert_eq!(window.start_canonical(), "2026-02-11T12:00:00Z");
        assert_eq!(window.end, now);
        assert_eq!(window.start_date(), "2026-02-11");

        let window =
            fetch_window(Some("2026-02-18T12:00:00Z"), Overlap::Seconds(300), boundary, now);
        assert_eq!(window.start_canonical(), "2026-02-18T11:55:00Z");
    }

    #[test]
    fn test_fetch_window_without_watermark() {
        let now = parse_timestamp("2026-02-20T00:00:00Z").unwrap();
        let boundary = parse_timestamp("2010-01-01").unwrap();

        let window = fetch_window(None, Overlap::Days(7), boundary, now);
        assert_eq!(window.start, boundary);

        // Opaque cursors fall back to the start boundary
        let window = fetch_window(Some("next:abc"), Overlap::Days(7), boundary, now);
        assert_eq!(window.start, boundary);
    }

    #[test]
    fn test_fetch_window_never_starts_after_now() {
        let now = parse_timestamp("2026-02-20T00:00:00Z").unwrap();
        let future = parse_timestamp("2030-01-01").unwrap();
        let window = fetch_window(None, Overlap::Days(1), future, now);
        assert_eq!(window.start, now);
    }

    #[test]
    fn test_fetch_window_with_out_of_range_overlap() {
        let now = parse_timestamp("2026-02-20T00:00:00Z").unwrap();
        let boundary = parse_timestamp("2010-01-01").unwrap();
        let wm = Some("2026-02-18T12:00:00Z");

        assert_eq!(Overlap::Days(9_999_999_999_999).as_duration(), None);
        let window = fetch_window(wm, Overlap::Days(9_999_999_999_999), boundary, now);
        assert_eq!(window.start, boundary);
        assert_eq!(fetch_window(wm, Overlap::Seconds(i64::MAX), boundary, now).start, boundary);
        // Representable, but earlier than any instant
        assert_eq!(fetch_window(wm, Overlap::Days(200_000_000), boundary, now).start, boundary);

        assert_eq!(Overlap::Days(-3).as_duration(), Some(Duration::zero()));
        let window = fetch_window(wm, Overlap::Days(-3), boundary, now);
        assert_eq!(window.start_canonical(), "2026-02-18T12:00:00Z");
    }
}

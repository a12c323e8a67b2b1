//! Wall-clock time sources and timestamp ordering.
//!
//! The engine never reads the system clock on its own. Every operation that
//! needs "now" receives it explicitly, which keeps merges and scheduling
//! decisions reproducible in tests.

use crate::Millis;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// A source of wall-clock milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> Millis;

    /// Current time as an ISO-8601 record timestamp.
    fn now_iso(&self) -> String {
        iso_timestamp(self.now_millis())
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        Utc::now().timestamp_millis().max(0) as Millis
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start` milliseconds.
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: Millis) {
        self.now.fetch_add(millis, AtomicOrdering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: Millis) {
        self.now.store(millis, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(AtomicOrdering::SeqCst)
    }
}

/// Format epoch milliseconds the way records store their `timestamp`.
pub fn iso_timestamp(millis: Millis) -> String {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a record timestamp into an instant.
///
/// Accepts RFC 3339 as well as the zone-less `YYYY-MM-DDTHH:MM[:SS]` and bare
/// date forms produced by form inputs and CSV imports (read as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Order two optional record timestamps.
///
/// A missing timestamp sorts before any present one. Parseable timestamps
/// compare chronologically; anything else falls back to string order.
pub fn compare_timestamps(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
    }
}

/// Calendar day (`YYYY-MM-DD`) of a date or date-time string.
pub fn calendar_day(value: &str) -> &str {
    value.split('T').next().unwrap_or(value)
}

//! Wall clock access.
//!
//! Timestamps are metadata only and never feed into identity or comparison.
//! Components take a [`Clock`] so tests can pin time.

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Current time as ISO-8601 with second precision and `+00:00` offset
    fn now_iso(&self) -> String {
        format_iso(self.now())
    }
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    /// Freeze at the given instant
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Format an instant the way record metadata stores it
#[must_use]
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Current UTC time as record metadata text
#[must_use]
pub fn utc_now_iso() -> String {
    SystemClock.now_iso()
}

/// Check that text parses as an RFC 3339 / ISO-8601 instant
#[must_use]
pub fn is_valid_iso_timestamp(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
}

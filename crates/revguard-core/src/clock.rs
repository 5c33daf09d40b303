use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Injected wherever a timestamp ends up in an artifact or a request so that
/// runs can be replayed deterministically in tests.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use revguard_core::{Clock, FixedClock};
///
/// let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
/// assert_eq!(FixedClock(at).now(), at);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

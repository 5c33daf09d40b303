//! Deterministic keys that let the GRC side drop duplicate evidence.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Key for one submission of one run.
///
/// SHA-256 over control id, subject (a change number or `report`), and the
/// run's start time. Retries of the same submission reuse the key; a new run
/// gets new keys.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use revguard_evidence::idempotency::idempotency_key;
///
/// let run = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
/// let a = idempotency_key("CTRL-1234", "pr-2", run);
/// assert_eq!(a, idempotency_key("CTRL-1234", "pr-2", run));
/// assert_ne!(a, idempotency_key("CTRL-1234", "pr-3", run));
/// assert_eq!(a.len(), 64);
/// ```
pub fn idempotency_key(control_id: &str, subject: &str, run_started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(control_id.as_bytes());
    hasher.update(b"|");
    hasher.update(subject.as_bytes());
    hasher.update(b"|");
    hasher.update(
        run_started_at
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

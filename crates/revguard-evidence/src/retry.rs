//! Bounded retry with exponential backoff for evidence submissions.

use std::future::Future;
use std::time::Duration;

use revguard_core::{AuditError, GrcConfig};

/// How often and how patiently a submission is retried.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use revguard_evidence::retry::RetryPolicy;
///
/// let policy = RetryPolicy { max_retries: 2, backoff_base_ms: 500 };
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = run once).
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base * 2^(n-1)` before the next one.
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        backoff_base_ms: 0,
    };

    /// Policy configured for the GRC client.
    pub fn from_config(config: &GrcConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GrcConfig::default())
    }
}

/// Whether a failed submission is worth another attempt.
///
/// Network errors, timeouts, 429 and 5xx are transient. Every other status is
/// a definitive answer from the server.
pub fn is_transient(err: &AuditError) -> bool {
    match err {
        AuditError::SubmissionFailure { status: None, .. } => true,
        AuditError::SubmissionFailure {
            status: Some(status),
            ..
        } => *status == 429 || (500..600).contains(status),
        _ => false,
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `op` receives the 1-based attempt number. On success the value is
/// returned together with the number of attempts used.
///
/// # Errors
///
/// Returns the last error produced by `op`.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, mut op: F) -> Result<(T, u32), AuditError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AuditError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(err) if attempt < max_attempts && is_transient(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, ?delay, "transient submission failure, retrying: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 1,
        }
    }

    #[test]
    fn classification() {
        assert!(is_transient(&AuditError::submission(None, "reset")));
        assert!(is_transient(&AuditError::submission(Some(500), "x")));
        assert!(is_transient(&AuditError::submission(Some(503), "x")));
        assert!(is_transient(&AuditError::submission(Some(429), "x")));
        assert!(!is_transient(&AuditError::submission(Some(400), "x")));
        assert!(!is_transient(&AuditError::submission(Some(401), "x")));
        assert!(!is_transient(&AuditError::submission(Some(200), "x")));
        assert!(!is_transient(&AuditError::Config("x".into())));
    }

    #[test]
    fn delay_saturates() {
        let policy = RetryPolicy {
            max_retries: 100,
            backoff_base_ms: u64::MAX,
        };
        assert_eq!(policy.delay_for(80), Duration::from_millis(u64::MAX));
        assert_eq!(RetryPolicy::NONE.max_attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = with_retry(fast(2), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(AuditError::submission(Some(502), "bad gateway"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry(fast(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AuditError::submission(Some(422), "invalid")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_retry(fast(2), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AuditError::submission(Some(500), "boom")) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

use std::fmt;

use serde::Serialize;

/// Stage of an audit run.
///
/// Runs move strictly forward: `Fetching → Evaluating → Rendering →
/// Submitting → Done`, or stop at [`RunState::Failed`] from any stage before
/// `Submitting`.
///
/// # Examples
///
/// ```
/// use revguard_runner::RunState;
///
/// assert!(RunState::Done.is_terminal());
/// assert!(!RunState::Rendering.is_terminal());
/// assert_eq!(RunState::Submitting.to_string(), "submitting");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Listing merged changes.
    Fetching,
    /// Fetching reviews and classifying changes.
    Evaluating,
    /// Producing the report artifact.
    Rendering,
    /// Sending evidence to the GRC system.
    Submitting,
    /// Finished; submission failures may still have been recorded.
    Done,
    /// Stopped by a fatal error; nothing was submitted.
    Failed,
}

impl RunState {
    /// Whether the run has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Evaluating => "evaluating",
            Self::Rendering => "rendering",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Progress hook for an audit run.
///
/// All methods default to no-ops.
pub trait RunObserver: Send + Sync {
    /// Called on every state transition, including the terminal one.
    fn on_state(&self, _state: RunState) {}

    /// Called after each change's reviews have been fetched.
    fn on_reviews_fetched(&self, _done: usize, _total: usize) {}

    /// Called after each evidence submission with its subject and outcome.
    fn on_submission(&self, _subject: &str, _ok: bool) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

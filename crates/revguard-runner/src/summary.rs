use std::fmt;
use std::path::PathBuf;

use revguard_compliance::ViolationSummary;
use revguard_core::AuditError;
use revguard_report::summary::{ReportSummary, TRUNCATION_NOTICE};
use serde::Serialize;

use crate::state::RunState;

/// Exit code for a run that finished with every submission accepted.
pub const EXIT_OK: i32 = 0;
/// Exit code for a run stopped by a fatal error.
pub const EXIT_FAILED: i32 = 1;
/// Exit code for a finished run with at least one rejected submission.
pub const EXIT_PARTIAL: i32 = 2;

/// One evidence submission that was not acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFailureRecord {
    /// `report` for the artifact, `PR #n` for a violation record.
    pub subject: String,
    /// HTTP status of the last attempt, if a response arrived.
    pub status: Option<u16>,
    /// Error message of the last attempt.
    pub message: String,
}

impl fmt::Display for SubmissionFailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status}): {}", self.subject, self.message),
            None => write!(f, "{}: {}", self.subject, self.message),
        }
    }
}

/// What an audit run did, for console and JSON output.
///
/// # Examples
///
/// ```
/// use revguard_runner::{RunState, RunSummary};
///
/// let summary = RunSummary::new("acme/api", "CTRL-1234", false);
/// assert_eq!(summary.state, RunState::Fetching);
/// assert_eq!(summary.submissions_failed, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Stage the run ended in.
    pub state: RunState,
    /// Audited repository, `owner/repo`.
    pub repo: String,
    /// Control the evidence was filed under.
    pub control_id: String,
    /// Whether submission was skipped on purpose.
    pub dry_run: bool,
    /// Counts and percentages, once evaluation finished.
    pub report: Option<ReportSummary>,
    /// Violations in source order.
    pub violations: Vec<ViolationSummary>,
    /// Rendered report location.
    pub report_path: Option<PathBuf>,
    /// Submissions sent, including failed ones.
    pub submissions_attempted: usize,
    /// Submissions that were not acknowledged.
    pub submissions_failed: usize,
    /// Details of every failed submission.
    pub failures: Vec<SubmissionFailureRecord>,
    /// Message of the fatal error, for failed runs.
    pub error: Option<String>,
}

impl RunSummary {
    /// Empty summary for a run that is about to start.
    pub fn new(repo: impl Into<String>, control_id: impl Into<String>, dry_run: bool) -> Self {
        Self {
            state: RunState::Fetching,
            repo: repo.into(),
            control_id: control_id.into(),
            dry_run,
            report: None,
            violations: Vec::new(),
            report_path: None,
            submissions_attempted: 0,
            submissions_failed: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn record_failure(&mut self, subject: String, err: &AuditError) {
        self.submissions_failed += 1;
        self.failures.push(SubmissionFailureRecord {
            subject,
            status: err.status(),
            message: err.to_string(),
        });
    }

    /// Render the summary as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# PR Approval Audit: {}\n\n", self.repo));
        out.push_str(&format!(
            "**Control:** {} | **State:** {}{}\n\n",
            self.control_id,
            self.state,
            if self.dry_run { " (dry run)" } else { "" }
        ));
        if let Some(err) = &self.error {
            out.push_str(&format!("> **Error:** {err}\n\n"));
        }
        if let Some(report) = &self.report {
            out.push_str(&report.to_markdown(&self.violations));
            out.push('\n');
        }
        if let Some(path) = &self.report_path {
            out.push_str(&format!("**Report:** `{}`\n\n", path.display()));
        }
        if self.submissions_attempted > 0 {
            out.push_str(&format!(
                "**Evidence:** {} submitted, {} failed\n\n",
                self.submissions_attempted, self.submissions_failed
            ));
            for failure in &self.failures {
                out.push_str(&format!("- {failure}\n"));
            }
        }
        out
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!("PR Approval Audit: {}", self.repo);
        writeln!(f, "{header}")?;
        writeln!(f, "{}", "=".repeat(header.chars().count()))?;
        writeln!(
            f,
            "Control: {} | State: {}{}\n",
            self.control_id,
            self.state,
            if self.dry_run { " (dry run)" } else { "" }
        )?;

        if let Some(err) = &self.error {
            writeln!(f, "Error: {err}")?;
        }

        if let Some(report) = &self.report {
            writeln!(f, "{}", report.total_line())?;
            writeln!(f, "{}", report.compliant_line())?;
            writeln!(f, "{}", report.violations_line())?;
            if report.truncated {
                writeln!(f, "Warning: {TRUNCATION_NOTICE}")?;
            }
            writeln!(f)?;
            if self.violations.is_empty() {
                writeln!(f, "All merged PRs had proper approvals.")?;
            } else {
                writeln!(
                    f,
                    "Found {} merged PRs without external approval:",
                    self.violations.len()
                )?;
                for v in &self.violations {
                    writeln!(f, "- {v}")?;
                }
            }
        }

        if let Some(path) = &self.report_path {
            writeln!(f, "\nReport: {}", path.display())?;
        }
        if self.submissions_attempted > 0 {
            writeln!(
                f,
                "Evidence: {} submitted, {} failed",
                self.submissions_attempted, self.submissions_failed
            )?;
            for failure in &self.failures {
                writeln!(f, "  - {failure}")?;
            }
        }
        Ok(())
    }
}

/// Summary plus the fatal error, if the run stopped early.
#[derive(Debug)]
pub struct RunOutcome {
    /// What the run did.
    pub summary: RunSummary,
    /// The error that moved the run to [`RunState::Failed`].
    pub error: Option<AuditError>,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    ///
    /// | Outcome | Code |
    /// |---------|------|
    /// | done, every submission acknowledged | 0 |
    /// | failed | 1 |
    /// | done, at least one submission failed | 2 |
    pub fn exit_code(&self) -> i32 {
        if self.error.is_some() || self.summary.state == RunState::Failed {
            EXIT_FAILED
        } else if self.summary.submissions_failed > 0 {
            EXIT_PARTIAL
        } else {
            EXIT_OK
        }
    }

    /// Whether the run reached [`RunState::Done`].
    pub fn is_done(&self) -> bool {
        self.summary.state == RunState::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn done_summary() -> RunSummary {
        let mut summary = RunSummary::new("acme/api", "CTRL-1234", false);
        summary.state = RunState::Done;
        summary.report = Some(ReportSummary::from_counts(1, 1, false));
        summary.violations = vec![ViolationSummary {
            number: 2,
            title: "Tweak CI".into(),
            author: "carol".into(),
            merged_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }];
        summary
    }

    #[test]
    fn exit_codes() {
        let ok = RunOutcome {
            summary: done_summary(),
            error: None,
        };
        assert_eq!(ok.exit_code(), EXIT_OK);

        let mut partial = done_summary();
        partial.record_failure("PR #2".into(), &AuditError::submission(Some(500), "boom"));
        let partial = RunOutcome {
            summary: partial,
            error: None,
        };
        assert_eq!(partial.exit_code(), EXIT_PARTIAL);

        let mut failed = RunSummary::new("acme/api", "CTRL-1234", false);
        failed.state = RunState::Failed;
        let failed = RunOutcome {
            summary: failed,
            error: Some(AuditError::upstream(Some(403), "forbidden")),
        };
        assert_eq!(failed.exit_code(), EXIT_FAILED);
        assert!(!failed.is_done());
    }

    #[test]
    fn failure_record_keeps_status() {
        let mut summary = done_summary();
        summary.record_failure("PR #3".into(), &AuditError::submission(Some(500), "boom"));
        assert_eq!(summary.submissions_failed, 1);
        assert_eq!(summary.failures[0].status, Some(500));
        assert!(summary.failures[0].to_string().starts_with("PR #3 (status 500)"));
    }

    #[test]
    fn display_lists_violations() {
        let text = done_summary().to_string();
        assert!(text.contains("Total merged PRs: 2"));
        assert!(text.contains("Found 1 merged PRs without external approval:"));
        assert!(text.contains("- PR #2 (Tweak CI) by carol merged at 2024-05-01T00:00:00Z"));
    }

    #[test]
    fn display_all_compliant() {
        let mut summary = done_summary();
        summary.report = Some(ReportSummary::from_counts(2, 0, false));
        summary.violations.clear();
        assert!(summary.to_string().contains("All merged PRs had proper approvals."));
    }

    #[test]
    fn markdown_reports_failures() {
        let mut summary = done_summary();
        summary.submissions_attempted = 2;
        summary.record_failure("report".into(), &AuditError::submission(None, "timed out"));
        let md = summary.to_markdown();
        assert!(md.starts_with("# PR Approval Audit: acme/api"));
        assert!(md.contains("**Evidence:** 2 submitted, 1 failed"));
        assert!(md.contains("- report: evidence submission failed: timed out"));
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(done_summary()).unwrap();
        assert_eq!(value["state"], "done");
        assert_eq!(value["controlId"], "CTRL-1234");
        assert_eq!(value["submissionsFailed"], 0);
    }
}

use std::fmt;

use revguard_compliance::ViolationSummary;
use revguard_core::ComplianceResult;
use serde::Serialize;

/// Aggregate counts and percentages of a compliance result.
///
/// Percentages are rounded to one decimal place. An empty result reports
/// 0.0% for both categories.
///
/// # Examples
///
/// ```
/// use revguard_core::ComplianceResult;
/// use revguard_report::summary::ReportSummary;
///
/// let summary = ReportSummary::from_result(&ComplianceResult::default());
/// assert_eq!(summary.total, 0);
/// assert_eq!(summary.compliant_pct, 0.0);
/// assert_eq!(summary.violation_pct, 0.0);
/// assert_eq!(summary.total_line(), "Total merged PRs: 0");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Number of evaluated merged changes.
    pub total: usize,
    /// Number of compliant changes.
    pub compliant: usize,
    /// Number of violations.
    pub violations: usize,
    /// Compliant share, 0–100.
    pub compliant_pct: f64,
    /// Violation share, 0–100.
    pub violation_pct: f64,
    /// Whether the underlying listing was cut short.
    pub truncated: bool,
}

impl ReportSummary {
    /// Compute the summary of a result.
    pub fn from_result(result: &ComplianceResult) -> Self {
        Self::from_counts(result.compliant.len(), result.violations.len(), result.truncated)
    }

    /// Compute the summary from raw counts.
    pub fn from_counts(compliant: usize, violations: usize, truncated: bool) -> Self {
        let total = compliant + violations;
        Self {
            total,
            compliant,
            violations,
            compliant_pct: percentage(compliant, total),
            violation_pct: percentage(violations, total),
            truncated,
        }
    }

    /// `Total merged PRs: {total}`
    pub fn total_line(&self) -> String {
        format!("Total merged PRs: {}", self.total)
    }

    /// `Compliant PRs: {n} ({p}%)`
    pub fn compliant_line(&self) -> String {
        format!("Compliant PRs: {} ({:.1}%)", self.compliant, self.compliant_pct)
    }

    /// `Violations: {n} ({p}%)`
    pub fn violations_line(&self) -> String {
        format!("Violations: {} ({:.1}%)", self.violations, self.violation_pct)
    }

    /// Render the summary and violation list as markdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use revguard_report::summary::ReportSummary;
    ///
    /// let md = ReportSummary::from_counts(2, 0, false).to_markdown(&[]);
    /// assert!(md.contains("# PR Approval Compliance Report"));
    /// assert!(md.contains("None"));
    /// ```
    pub fn to_markdown(&self, violations: &[ViolationSummary]) -> String {
        let mut out = String::new();
        out.push_str("# PR Approval Compliance Report\n\n");
        out.push_str("## Summary\n\n");
        out.push_str(&format!("- {}\n", self.total_line()));
        out.push_str(&format!("- {}\n", self.compliant_line()));
        out.push_str(&format!("- {}\n\n", self.violations_line()));
        if self.truncated {
            out.push_str(&format!("> **Warning:** {TRUNCATION_NOTICE}\n\n"));
        }
        out.push_str("## Violations\n\n");
        if violations.is_empty() {
            out.push_str("None\n");
        } else {
            for v in violations {
                out.push_str(&format!(
                    "- PR #{} ({}) by `{}` merged at {}\n",
                    v.number,
                    v.title,
                    v.author,
                    v.merged_at_rfc3339()
                ));
            }
        }
        out
    }
}

/// Shown whenever a listing stopped at the page bound.
pub const TRUNCATION_NOTICE: &str =
    "the pull request listing was truncated; counts cover only the fetched pages";

/// `part / total` as a percentage rounded to one decimal, 0.0 when `total` is 0.
///
/// # Examples
///
/// ```
/// use revguard_report::summary::percentage;
///
/// assert_eq!(percentage(1, 3), 33.3);
/// assert_eq!(percentage(2, 3), 66.7);
/// assert_eq!(percentage(5, 0), 0.0);
/// ```
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PR Approval Compliance")?;
        writeln!(f, "======================")?;
        writeln!(f, "{}", self.total_line())?;
        writeln!(f, "{}", self.compliant_line())?;
        writeln!(f, "{}", self.violations_line())?;
        if self.truncated {
            writeln!(f, "Warning: {TRUNCATION_NOTICE}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn three_change_scenario_lines() {
        let summary = ReportSummary::from_counts(1, 2, false);
        assert_eq!(summary.total_line(), "Total merged PRs: 3");
        assert_eq!(summary.compliant_line(), "Compliant PRs: 1 (33.3%)");
        assert_eq!(summary.violations_line(), "Violations: 2 (66.7%)");
    }

    #[test]
    fn zero_total_has_zero_percentages() {
        let summary = ReportSummary::from_counts(0, 0, false);
        assert_eq!(summary.compliant_line(), "Compliant PRs: 0 (0.0%)");
        assert_eq!(summary.violations_line(), "Violations: 0 (0.0%)");
    }

    #[test]
    fn all_compliant_is_hundred_percent() {
        let summary = ReportSummary::from_counts(4, 0, false);
        assert_eq!(summary.compliant_pct, 100.0);
        assert_eq!(summary.violation_pct, 0.0);
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert_eq!(percentage(1, 6), 16.7);
        assert_eq!(percentage(1, 8), 12.5);
        assert_eq!(percentage(2, 7), 28.6);
    }

    #[test]
    fn display_mentions_truncation() {
        let text = ReportSummary::from_counts(1, 1, true).to_string();
        assert!(text.contains("Total merged PRs: 2"));
        assert!(text.contains("truncated"));
    }

    #[test]
    fn markdown_lists_violations() {
        let v = ViolationSummary {
            number: 2,
            title: "Tweak CI".into(),
            author: "carol".into(),
            merged_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        };
        let md = ReportSummary::from_counts(1, 1, false).to_markdown(&[v]);
        assert!(md.contains("- PR #2 (Tweak CI) by `carol` merged at 2024-05-01T10:00:00Z"));
        assert!(!md.contains("None"));
    }

    #[test]
    fn summary_serializes_camel_case() {
        let json = serde_json::to_value(ReportSummary::from_counts(1, 2, false)).unwrap();
        assert_eq!(json["compliantPct"], 33.3);
        assert_eq!(json["total"], 3);
    }
}

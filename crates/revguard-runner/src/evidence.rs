//! Evidence records the runner files for a finished evaluation.

use chrono::{DateTime, SecondsFormat, Utc};
use revguard_core::{ComplianceVerdict, EvidenceRecord, EvidenceType};
use revguard_evidence::idempotency::idempotency_key;
use serde_json::json;

/// Source recorded on per-violation evidence.
pub const VIOLATION_SOURCE: &str = "GitHub API";

/// Description attached to the uploaded report.
pub const REPORT_DESCRIPTION: &str = "Automated PR compliance PDF report";

/// Idempotency subject of a violation record.
pub fn violation_subject(change_id: u64) -> String {
    format!("pr-{change_id}")
}

/// Structured evidence for one violating change.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use revguard_compliance::evaluate;
/// use revguard_core::{EvidenceType, Identity, MergedChange};
/// use revguard_runner::evidence::violation_record;
///
/// let change = MergedChange {
///     id: 2,
///     title: "Tweak CI".into(),
///     author: Identity::new("carol"),
///     merged_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
/// };
/// let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
/// let record = violation_record("CTRL-1234", &evaluate(&change, &[]), now, now);
/// assert_eq!(record.evidence_type, EvidenceType::ApprovalRecord);
/// assert_eq!(
///     record.description,
///     "Pull request #2 (Tweak CI) merged by carol without external approval."
/// );
/// assert_eq!(record.content["pr_id"], 2);
/// ```
pub fn violation_record(
    control_id: &str,
    verdict: &ComplianceVerdict,
    timestamp: DateTime<Utc>,
    run_started_at: DateTime<Utc>,
) -> EvidenceRecord {
    let change = verdict.change();
    EvidenceRecord {
        control_id: control_id.to_string(),
        timestamp,
        evidence_type: EvidenceType::ApprovalRecord,
        description: format!(
            "Pull request #{} ({}) merged by {} without external approval.",
            change.id, change.title, change.author
        ),
        source: VIOLATION_SOURCE.to_string(),
        content: json!({
            "pr_id": change.id,
            "author": change.author.as_str(),
            "merged_at": change.merged_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
        idempotency_key: Some(idempotency_key(
            control_id,
            &violation_subject(change.id),
            run_started_at,
        )),
    }
}

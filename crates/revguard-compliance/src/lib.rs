//! Approval compliance evaluation.
//!
//! A merged change is compliant when at least one review approves it and
//! that review comes from an identity other than the change's author.
//! Evaluation is a pure reduction over the full review set: order, time,
//! and the number of self-approvals play no part.

use std::fmt;

use chrono::{DateTime, Utc};
use revguard_core::{ComplianceResult, ComplianceVerdict, MergedChange, Review};
use serde::Serialize;

/// Evaluate one change against its reviews.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use revguard_compliance::evaluate;
/// use revguard_core::{ComplianceStatus, Identity, MergedChange, Review, ReviewState};
///
/// let change = MergedChange {
///     id: 2,
///     title: "Tweak CI".into(),
///     author: Identity::new("carol"),
///     merged_at: Utc::now(),
/// };
/// let self_approval = Review {
///     change_id: 2,
///     reviewer: Identity::new("carol"),
///     state: ReviewState::Approved,
///     submitted_at: None,
/// };
/// let verdict = evaluate(&change, &[self_approval]);
/// assert_eq!(verdict.status(), ComplianceStatus::Violation);
/// ```
pub fn evaluate(change: &MergedChange, reviews: &[Review]) -> ComplianceVerdict {
    let qualifying: Vec<Review> = reviews
        .iter()
        .filter(|r| qualifies(change, r))
        .cloned()
        .collect();
    ComplianceVerdict::new(change.clone(), qualifying)
}

/// Whether `review` counts towards `change`'s compliance.
pub fn qualifies(change: &MergedChange, review: &Review) -> bool {
    review.is_approval() && review.reviewer != change.author
}

/// Evaluate every change and partition the verdicts, keeping input order.
///
/// `lookup` returns the reviews of a change by its id. Every input change
/// lands in exactly one of the two output sequences.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
///
/// use chrono::Utc;
/// use revguard_compliance::aggregate;
/// use revguard_core::{Identity, MergedChange, Review};
///
/// let changes = vec![MergedChange {
///     id: 3,
///     title: "Docs".into(),
///     author: Identity::new("dave"),
///     merged_at: Utc::now(),
/// }];
/// let reviews: HashMap<u64, Vec<Review>> = HashMap::new();
/// let result = aggregate(changes, |id| reviews.get(&id).cloned().unwrap_or_default());
/// assert_eq!(result.violations.len(), 1);
/// assert_eq!(result.total(), 1);
/// ```
pub fn aggregate<I, F, R>(changes: I, mut lookup: F) -> ComplianceResult
where
    I: IntoIterator<Item = MergedChange>,
    F: FnMut(u64) -> R,
    R: AsRef<[Review]>,
{
    let mut result = ComplianceResult::default();
    for change in changes {
        let reviews = lookup(change.id);
        let verdict = evaluate(&change, reviews.as_ref());
        if verdict.is_compliant() {
            result.compliant.push(verdict);
        } else {
            result.violations.push(verdict);
        }
    }
    result
}

/// The flattened view of a violation used for console output and evidence.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use revguard_compliance::{evaluate, ViolationSummary};
/// use revguard_core::{Identity, MergedChange};
///
/// let change = MergedChange {
///     id: 3,
///     title: "Docs".into(),
///     author: Identity::new("dave"),
///     merged_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
/// };
/// let summary = ViolationSummary::from(&evaluate(&change, &[]));
/// assert_eq!(
///     summary.to_string(),
///     "PR #3 (Docs) by dave merged at 2024-03-01T09:30:00Z"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationSummary {
    /// Pull request number.
    pub number: u64,
    /// Pull request title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// Merge timestamp.
    pub merged_at: DateTime<Utc>,
}

impl ViolationSummary {
    /// Merge timestamp in the RFC 3339 form GitHub uses (`...Z`).
    pub fn merged_at_rfc3339(&self) -> String {
        self.merged_at
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// Build summaries for every violation of a result, in order.
    pub fn all(result: &ComplianceResult) -> Vec<Self> {
        result.violations.iter().map(Self::from).collect()
    }
}

impl From<&ComplianceVerdict> for ViolationSummary {
    fn from(verdict: &ComplianceVerdict) -> Self {
        let change = verdict.change();
        Self {
            number: change.id,
            title: change.title.clone(),
            author: change.author.to_string(),
            merged_at: change.merged_at,
        }
    }
}

impl fmt::Display for ViolationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PR #{} ({}) by {} merged at {}",
            self.number,
            self.title,
            self.author,
            self.merged_at_rfc3339()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::TimeZone;
    use revguard_core::{ComplianceStatus, Identity, ReviewState};

    fn change(id: u64, author: &str) -> MergedChange {
        MergedChange {
            id,
            title: format!("change {id}"),
            author: Identity::new(author),
            merged_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, id as u32).unwrap(),
        }
    }

    fn review(change_id: u64, reviewer: &str, state: ReviewState) -> Review {
        Review {
            change_id,
            reviewer: Identity::new(reviewer),
            state,
            submitted_at: None,
        }
    }

    #[test]
    fn no_reviews_is_violation() {
        let verdict = evaluate(&change(1, "alice"), &[]);
        assert_eq!(verdict.status(), ComplianceStatus::Violation);
        assert!(verdict.qualifying_reviews().is_empty());
    }

    #[test]
    fn comments_and_change_requests_never_qualify() {
        let reviews = vec![
            review(1, "bob", ReviewState::Commented),
            review(1, "carol", ReviewState::ChangesRequested),
            review(1, "dave", ReviewState::Other("DISMISSED".into())),
        ];
        let verdict = evaluate(&change(1, "alice"), &reviews);
        assert_eq!(verdict.status(), ComplianceStatus::Violation);
    }

    #[test]
    fn self_approval_alone_is_violation() {
        let reviews = vec![
            review(1, "alice", ReviewState::Approved),
            review(1, "alice", ReviewState::Approved),
            review(1, "bob", ReviewState::Commented),
        ];
        let verdict = evaluate(&change(1, "alice"), &reviews);
        assert_eq!(verdict.status(), ComplianceStatus::Violation);
    }

    #[test]
    fn external_approval_is_compliant_despite_noise() {
        let reviews = vec![
            review(1, "carol", ReviewState::ChangesRequested),
            review(1, "bob", ReviewState::Approved),
            review(1, "alice", ReviewState::Approved),
        ];
        let verdict = evaluate(&change(1, "alice"), &reviews);
        assert!(verdict.is_compliant());
        assert_eq!(verdict.qualifying_reviews().len(), 1);
        assert_eq!(verdict.qualifying_reviews()[0].reviewer, Identity::new("bob"));
    }

    #[test]
    fn later_change_request_does_not_revoke_approval() {
        let reviews = vec![
            review(1, "bob", ReviewState::Approved),
            review(1, "bob", ReviewState::ChangesRequested),
        ];
        assert!(evaluate(&change(1, "alice"), &reviews).is_compliant());
    }

    #[test]
    fn identity_comparison_is_case_sensitive() {
        let reviews = vec![review(1, "Alice", ReviewState::Approved)];
        assert!(evaluate(&change(1, "alice"), &reviews).is_compliant());
    }

    #[test]
    fn evaluation_is_order_independent() {
        let mut reviews = vec![
            review(1, "alice", ReviewState::Approved),
            review(1, "bob", ReviewState::Commented),
            review(1, "erin", ReviewState::Approved),
        ];
        let first = evaluate(&change(1, "alice"), &reviews);
        reviews.reverse();
        let second = evaluate(&change(1, "alice"), &reviews);
        assert_eq!(first.status(), second.status());
    }

    #[test]
    fn aggregate_partitions_in_source_order() {
        let changes = vec![change(1, "alice"), change(2, "carol"), change(3, "dave")];
        let mut reviews: HashMap<u64, Vec<Review>> = HashMap::new();
        reviews.insert(1, vec![review(1, "bob", ReviewState::Approved)]);
        reviews.insert(2, vec![review(2, "carol", ReviewState::Approved)]);

        let result = aggregate(changes, |id| reviews.get(&id).cloned().unwrap_or_default());

        let compliant: Vec<u64> = result.compliant.iter().map(|v| v.change().id).collect();
        let violations: Vec<u64> = result.violations.iter().map(|v| v.change().id).collect();
        assert_eq!(compliant, vec![1]);
        assert_eq!(violations, vec![2, 3]);
        assert_eq!(result.total(), 3);
        assert!(!result.truncated);
    }

    #[test]
    fn aggregate_never_drops_or_duplicates() {
        let changes: Vec<MergedChange> = (1..=20)
            .map(|id| change(id, if id % 3 == 0 { "x" } else { "y" }))
            .collect();
        let result = aggregate(changes, |id| {
            if id % 2 == 0 {
                vec![review(id, "x", ReviewState::Approved)]
            } else {
                Vec::new()
            }
        });
        let mut ids: Vec<u64> = result
            .compliant
            .iter()
            .chain(result.violations.iter())
            .map(|v| v.change().id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn aggregate_of_nothing_is_empty() {
        let result = aggregate(Vec::new(), |_| Vec::<Review>::new());
        assert!(result.is_empty());
    }

    #[test]
    fn violation_summary_serializes() {
        let verdict = evaluate(&change(9, "zoe"), &[]);
        let json = serde_json::to_value(ViolationSummary::from(&verdict)).unwrap();
        assert_eq!(json["number"], 9);
        assert_eq!(json["author"], "zoe");
    }
}

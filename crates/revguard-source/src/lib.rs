//! Merged pull request and review listings from the source-control host.
//!
//! [`ReviewSource`] is the seam the audit runner depends on;
//! [`github::GitHubSource`] implements it over the GitHub REST API and
//! follows `Link` pagination until the listing is exhausted (or a configured
//! page bound is hit, in which case the listing is flagged as truncated).

pub mod github;
pub mod pagination;

use async_trait::async_trait;
use revguard_core::{AuditError, ChangeListing, RepoRef, Review};

/// Read access to merge and review history.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// List pull requests that were merged, in the order the host returns them.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::UpstreamUnavailable`] on any non-2xx response,
    /// network failure, or timeout.
    async fn list_merged_changes(&self, repo: &RepoRef) -> Result<ChangeListing, AuditError>;

    /// List every review recorded on one pull request.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::UpstreamUnavailable`] on any non-2xx response,
    /// network failure, or timeout.
    async fn list_reviews(&self, repo: &RepoRef, change_id: u64) -> Result<Vec<Review>, AuditError>;
}

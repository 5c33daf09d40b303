//! Evidence submission to the GRC system.
//!
//! [`EvidenceSink`] is the seam the audit runner depends on;
//! [`ErambaClient`] implements it against the Eramba evidence API with
//! bounded retries ([`retry`]) and per-submission idempotency keys
//! ([`idempotency`]).

pub mod eramba;
pub mod idempotency;
pub mod retry;

pub use eramba::ErambaClient;

use async_trait::async_trait;
use revguard_core::{Acknowledgement, AuditError, EvidenceRecord, ReportArtifact};

/// Write access to a control's evidence.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    /// Submit one structured record under `control_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SubmissionFailure`] unless the GRC system
    /// acknowledges with HTTP 201.
    async fn submit_structured(
        &self,
        control_id: &str,
        record: &EvidenceRecord,
    ) -> Result<Acknowledgement, AuditError>;

    /// Upload a rendered report under `control_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::SubmissionFailure`] unless the GRC system
    /// acknowledges with HTTP 201, or if the artifact cannot be read.
    async fn submit_artifact(
        &self,
        control_id: &str,
        artifact: &ReportArtifact,
        description: &str,
    ) -> Result<Acknowledgement, AuditError>;
}

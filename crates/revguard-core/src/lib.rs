//! Core types, configuration, and error handling for revguard.
//!
//! This crate provides the shared foundation used by all other revguard crates:
//! - [`AuditError`]: unified error type using `thiserror` and `miette`
//! - [`AuditConfig`]: configuration loaded from `.revguard.toml` and the environment
//! - Shared types: [`Identity`], [`MergedChange`], [`Review`], [`ComplianceVerdict`],
//!   [`ComplianceResult`], [`EvidenceRecord`], [`ReportArtifact`]

mod clock;
mod config;
mod error;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AuditConfig, GitHubConfig, GrcConfig, ReportConfig};
pub use error::{body_excerpt, AuditError, ERROR_BODY_LIMIT};
pub use types::{
    Acknowledgement, ArtifactFormat, ChangeListing, ComplianceResult, ComplianceStatus,
    ComplianceVerdict, EvidenceRecord, EvidenceType, Identity, MergedChange, OutputFormat,
    RepoRef, ReportArtifact, Review, ReviewState,
};

/// A convenience `Result` type for revguard operations.
pub type Result<T> = std::result::Result<T, AuditError>;

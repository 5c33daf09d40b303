use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// A source-control account identity (a GitHub login).
///
/// Equality is exact and case-sensitive: `"Alice"` and `"alice"` are two
/// different identities. No trimming or folding is applied.
///
/// # Examples
///
/// ```
/// use revguard_core::Identity;
///
/// let author = Identity::new("alice");
/// assert_eq!(author, Identity::from("alice"));
/// assert_ne!(author, Identity::from("Alice"));
/// assert_eq!(author.to_string(), "alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Login GitHub shows for deleted accounts.
    pub const GHOST: &'static str = "ghost";

    /// Create an identity from a login.
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    /// The placeholder identity for a deleted account.
    pub fn ghost() -> Self {
        Self(Self::GHOST.to_string())
    }

    /// The raw login.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(login: &str) -> Self {
        Self::new(login)
    }
}

impl From<String> for Identity {
    fn from(login: String) -> Self {
        Self(login)
    }
}

/// A repository on the source-control host, `owner/repo`.
///
/// # Examples
///
/// ```
/// use revguard_core::RepoRef;
///
/// let repo: RepoRef = "octocat/hello-world".parse().unwrap();
/// assert_eq!(repo.owner, "octocat");
/// assert_eq!(repo.repo, "hello-world");
/// assert_eq!(repo.to_string(), "octocat/hello-world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Account or organization owning the repository.
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoRef {
    /// Build a reference from its two parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl FromStr for RepoRef {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((owner, repo)) = s.split_once('/') else {
            return Err(AuditError::Config(format!(
                "invalid repository '{s}', expected owner/repo"
            )));
        };
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(AuditError::Config(format!(
                "invalid repository '{s}', expected owner/repo"
            )));
        }
        Ok(Self::new(owner, repo))
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A pull request that was merged into the target branch.
///
/// # Examples
///
/// ```
/// use revguard_core::{Identity, MergedChange};
/// use chrono::{TimeZone, Utc};
///
/// let change = MergedChange {
///     id: 42,
///     title: "Add login page".into(),
///     author: Identity::new("alice"),
///     merged_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
/// };
/// assert_eq!(change.id, 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedChange {
    /// Pull request number, unique per repository.
    pub id: u64,
    /// Pull request title.
    pub title: String,
    /// Account that opened the pull request.
    pub author: Identity,
    /// When the pull request was merged.
    pub merged_at: DateTime<Utc>,
}

/// The decision recorded by a review.
///
/// Wire values are matched case-insensitively; anything unrecognized
/// (`DISMISSED`, `PENDING`, ...) is kept verbatim as [`ReviewState::Other`].
///
/// # Examples
///
/// ```
/// use revguard_core::ReviewState;
///
/// assert_eq!("approved".parse::<ReviewState>().unwrap(), ReviewState::Approved);
/// assert_eq!(
///     "DISMISSED".parse::<ReviewState>().unwrap(),
///     ReviewState::Other("DISMISSED".into())
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReviewState {
    /// The reviewer approved the change.
    Approved,
    /// The reviewer asked for changes.
    ChangesRequested,
    /// The reviewer left comments without a decision.
    Commented,
    /// Any other state reported by the host.
    Other(String),
}

impl FromStr for ReviewState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "APPROVED" => Self::Approved,
            "CHANGES_REQUESTED" => Self::ChangesRequested,
            "COMMENTED" => Self::Commented,
            _ => Self::Other(s.to_string()),
        })
    }
}

impl From<String> for ReviewState {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(state) => state,
            Err(never) => match never {},
        }
    }
}

impl From<ReviewState> for String {
    fn from(state: ReviewState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "APPROVED"),
            Self::ChangesRequested => write!(f, "CHANGES_REQUESTED"),
            Self::Commented => write!(f, "COMMENTED"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A reviewer decision attached to a merged change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Number of the pull request this review belongs to.
    pub change_id: u64,
    /// Account that submitted the review.
    pub reviewer: Identity,
    /// Recorded decision.
    pub state: ReviewState,
    /// Submission time; absent for pending reviews.
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Review {
    /// Whether this review is an approval, regardless of who gave it.
    pub fn is_approval(&self) -> bool {
        self.state == ReviewState::Approved
    }
}

/// Outcome of the approval check for one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    /// At least one approval came from someone other than the author.
    Compliant,
    /// No qualifying approval exists.
    Violation,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compliant => write!(f, "compliant"),
            Self::Violation => write!(f, "violation"),
        }
    }
}

/// A merged change together with its compliance status.
///
/// The status is derived from the qualifying reviews at construction, so a
/// verdict is compliant exactly when `qualifying_reviews` is non-empty.
///
/// # Examples
///
/// ```
/// use revguard_core::{ComplianceStatus, ComplianceVerdict, Identity, MergedChange};
/// use chrono::Utc;
///
/// let change = MergedChange {
///     id: 3,
///     title: "Bump deps".into(),
///     author: Identity::new("dave"),
///     merged_at: Utc::now(),
/// };
/// let verdict = ComplianceVerdict::new(change, Vec::new());
/// assert_eq!(verdict.status(), ComplianceStatus::Violation);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceVerdict {
    change: MergedChange,
    status: ComplianceStatus,
    qualifying_reviews: Vec<Review>,
}

impl ComplianceVerdict {
    /// Build a verdict from the change and the reviews that qualify it.
    pub fn new(change: MergedChange, qualifying_reviews: Vec<Review>) -> Self {
        let status = if qualifying_reviews.is_empty() {
            ComplianceStatus::Violation
        } else {
            ComplianceStatus::Compliant
        };
        Self {
            change,
            status,
            qualifying_reviews,
        }
    }

    /// The evaluated change.
    pub fn change(&self) -> &MergedChange {
        &self.change
    }

    /// Compliance status.
    pub fn status(&self) -> ComplianceStatus {
        self.status
    }

    /// Approvals from identities other than the author.
    pub fn qualifying_reviews(&self) -> &[Review] {
        &self.qualifying_reviews
    }

    /// Shorthand for `status() == Compliant`.
    pub fn is_compliant(&self) -> bool {
        self.status == ComplianceStatus::Compliant
    }
}

/// All verdicts of one run, partitioned by status in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceResult {
    /// Changes with at least one qualifying approval.
    pub compliant: Vec<ComplianceVerdict>,
    /// Changes without a qualifying approval.
    pub violations: Vec<ComplianceVerdict>,
    /// `true` when the change listing stopped at a page bound while more
    /// pages were available, so the counts are a lower bound.
    pub truncated: bool,
}

impl ComplianceResult {
    /// Number of evaluated changes.
    pub fn total(&self) -> usize {
        self.compliant.len() + self.violations.len()
    }

    /// Whether no change was evaluated.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// The merged changes returned by a listing, plus pagination bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeListing {
    /// Merged changes, in the order the host returned them.
    pub changes: Vec<MergedChange>,
    /// Number of pages requested.
    pub pages_fetched: u32,
    /// Whether more pages existed beyond the configured bound.
    pub truncated: bool,
}

impl ChangeListing {
    /// Drop repeated change ids, keeping the first occurrence.
    ///
    /// Offset pagination can return a change twice when the listing shifts
    /// between page requests. Returns the ids that were dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use revguard_core::{ChangeListing, Identity, MergedChange};
    ///
    /// let change = |id| MergedChange {
    ///     id,
    ///     title: format!("change {id}"),
    ///     author: Identity::new("alice"),
    ///     merged_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    /// };
    /// let mut listing = ChangeListing {
    ///     changes: vec![change(7), change(8), change(7)],
    ///     ..ChangeListing::default()
    /// };
    /// assert_eq!(listing.dedup(), vec![7]);
    /// assert_eq!(listing.changes.len(), 2);
    /// ```
    pub fn dedup(&mut self) -> Vec<u64> {
        let mut seen = HashSet::with_capacity(self.changes.len());
        let mut dropped = Vec::new();
        self.changes.retain(|change| {
            if seen.insert(change.id) {
                true
            } else {
                dropped.push(change.id);
                false
            }
        });
        dropped
    }
}

/// Kind of evidence stored against a control.
///
/// # Examples
///
/// ```
/// use revguard_core::EvidenceType;
///
/// assert_eq!(EvidenceType::ApprovalRecord.to_string(), "approval_record");
/// assert_eq!(serde_json::to_string(&EvidenceType::Report).unwrap(), "\"report\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// Free-form log output.
    Log,
    /// A rendered report document.
    Report,
    /// A record about one change's approvals.
    ApprovalRecord,
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Report => write!(f, "report"),
            Self::ApprovalRecord => write!(f, "approval_record"),
        }
    }
}

/// One structured evidence entry destined for the GRC system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    /// Control the evidence is filed under.
    pub control_id: String,
    /// When the evidence was produced.
    pub timestamp: DateTime<Utc>,
    /// Evidence kind.
    pub evidence_type: EvidenceType,
    /// Human-readable summary.
    pub description: String,
    /// System the evidence came from.
    pub source: String,
    /// Opaque key-value payload.
    pub content: serde_json::Value,
    /// Deduplication token sent alongside the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// File format of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Portable Document Format.
    Pdf,
}

impl ArtifactFormat {
    /// MIME type used when uploading the artifact.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
        }
    }
}

/// A rendered report on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    /// Document format.
    pub format: ArtifactFormat,
    /// Location of the finished document.
    pub path: PathBuf,
    /// Chart image embedded in the document, if it was kept on disk.
    pub chart_path: Option<PathBuf>,
    /// Document size in bytes.
    pub size_bytes: u64,
}

impl ReportArtifact {
    /// File name used for uploads, falling back to a generic name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.pdf".to_string())
    }

    /// Location of the finished document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The GRC system's answer to an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    /// HTTP status of the accepting response (always 201).
    pub status: u16,
    /// Parsed response body; non-JSON bodies are kept as a string.
    pub body: serde_json::Value,
    /// Number of attempts it took, 1 when the first attempt succeeded.
    pub attempts: u32,
}

/// Console output format of the CLI.
///
/// # Examples
///
/// ```
/// use revguard_core::OutputFormat;
///
/// assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
/// assert_eq!(OutputFormat::default().to_string(), "text");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Summary lines for a terminal.
    #[default]
    Text,
    /// Run summary as JSON with camelCase keys.
    Json,
    /// Markdown suitable for a CI job summary.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Errors that can occur across the revguard pipeline.
///
/// The three audit-specific variants carry the run policy:
/// [`AuditError::UpstreamUnavailable`] and [`AuditError::RenderFailure`] are
/// fatal to a run, while [`AuditError::SubmissionFailure`] is recorded and
/// the run keeps going. Library crates return this type directly; the binary
/// reports it through `miette`.
///
/// # Examples
///
/// ```
/// use revguard_core::AuditError;
///
/// let err = AuditError::upstream(Some(403), "GET /repos/acme/api/pulls returned 403");
/// assert!(err.is_fatal());
/// assert_eq!(err.status(), Some(403));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AuditError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    #[diagnostic(code(revguard::io))]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(revguard::config),
        help("run 'revguard doctor' to see which settings are missing")
    )]
    Config(String),

    /// The source-control API answered with a non-2xx status, timed out, or
    /// could not be reached.
    #[error("source-control API unavailable: {message}")]
    #[diagnostic(
        code(revguard::upstream),
        help("check GITHUB_TOKEN scopes and the repository name; no evidence was submitted")
    )]
    UpstreamUnavailable {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Human-readable cause.
        message: String,
    },

    /// The report document could not be produced.
    #[error("report rendering failed: {0}")]
    #[diagnostic(code(revguard::render))]
    RenderFailure(String),

    /// The GRC API rejected or did not acknowledge one evidence record.
    #[error("evidence submission failed: {message}")]
    #[diagnostic(code(revguard::submission))]
    SubmissionFailure {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Human-readable cause, including the response body when available.
        message: String,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    #[diagnostic(code(revguard::serialization))]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(revguard::toml))]
    Toml(#[from] toml::de::Error),
}

impl AuditError {
    /// Build an [`AuditError::UpstreamUnavailable`].
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            status,
            message: message.into(),
        }
    }

    /// Build an [`AuditError::SubmissionFailure`].
    pub fn submission(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::SubmissionFailure {
            status,
            message: message.into(),
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamUnavailable { status, .. } | Self::SubmissionFailure { status, .. } => {
                *status
            }
            _ => None,
        }
    }

    /// Whether this error aborts the whole run.
    ///
    /// Only submission failures are recoverable; everything else stops the
    /// pipeline before any evidence leaves the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SubmissionFailure { .. })
    }
}

/// Largest response body excerpt kept in error messages, in characters.
pub const ERROR_BODY_LIMIT: usize = 300;

/// Trimmed response body, cut at [`ERROR_BODY_LIMIT`] characters with an
/// ellipsis appended.
///
/// # Examples
///
/// ```
/// use revguard_core::{body_excerpt, ERROR_BODY_LIMIT};
///
/// assert_eq!(body_excerpt("  Bad credentials \n"), "Bad credentials");
/// assert_eq!(body_excerpt(&"x".repeat(1000)).chars().count(), ERROR_BODY_LIMIT + 1);
/// ```
pub fn body_excerpt(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= ERROR_BODY_LIMIT {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    cut.push('…');
    cut
}

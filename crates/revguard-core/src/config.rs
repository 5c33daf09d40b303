use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::types::RepoRef;

/// Top-level configuration loaded from `.revguard.toml`.
///
/// Built once at process start and handed to each component by reference.
/// Resolution order: CLI flags > environment > config file > defaults. The
/// environment layer is applied through [`AuditConfig::apply_env`] with an
/// injected lookup, so no library crate reads the process environment itself.
///
/// # Examples
///
/// ```
/// use revguard_core::AuditConfig;
///
/// let config = AuditConfig::default();
/// assert_eq!(config.github.per_page, 50);
/// assert_eq!(config.grc.control_id, "CTRL-1234");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Source-control host settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// GRC evidence store settings.
    #[serde(default)]
    pub grc: GrcConfig,
    /// Report output settings.
    #[serde(default)]
    pub report: ReportConfig,
}

impl AuditConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be read, or
    /// [`AuditError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, AuditError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use revguard_core::AuditConfig;
    ///
    /// let toml = r#"
    /// [github]
    /// owner = "acme"
    /// repo = "api"
    /// per_page = 100
    /// "#;
    /// let config = AuditConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.github.per_page, 100);
    /// assert_eq!(config.repo_ref().unwrap().to_string(), "acme/api");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, AuditError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from environment-style variables.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset. Empty
    /// values are treated as unset. Recognized variables: `GITHUB_TOKEN`,
    /// `GITHUB_OWNER`, `GITHUB_REPO`, `GITHUB_PER_PAGE`, `GITHUB_API_URL`,
    /// `ERAMBA_URL`, `ERAMBA_API_TOKEN`, `ERAMBA_CONTROL_ID`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Config`] if `GITHUB_PER_PAGE` is not a number.
    ///
    /// # Examples
    ///
    /// ```
    /// use revguard_core::AuditConfig;
    ///
    /// let mut config = AuditConfig::default();
    /// config
    ///     .apply_env(|key| match key {
    ///         "GITHUB_OWNER" => Some("acme".to_string()),
    ///         "ERAMBA_CONTROL_ID" => Some("CTRL-9".to_string()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.github.owner.as_deref(), Some("acme"));
    /// assert_eq!(config.grc.control_id, "CTRL-9");
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AuditError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(owner) = get("GITHUB_OWNER") {
            self.github.owner = Some(owner);
        }
        if let Some(repo) = get("GITHUB_REPO") {
            self.github.repo = Some(repo);
        }
        if let Some(per_page) = get("GITHUB_PER_PAGE") {
            self.github.per_page = per_page
                .trim()
                .parse()
                .ok()
                .filter(|&n: &u32| n > 0)
                .ok_or_else(|| {
                    AuditError::Config(format!(
                        "GITHUB_PER_PAGE must be a positive integer, got '{per_page}'"
                    ))
                })?;
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(url) = get("ERAMBA_URL") {
            self.grc.url = url;
        }
        if let Some(token) = get("ERAMBA_API_TOKEN") {
            self.grc.api_token = Some(token);
        }
        if let Some(control_id) = get("ERAMBA_CONTROL_ID") {
            self.grc.control_id = control_id;
        }
        Ok(())
    }

    /// The repository to audit.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Config`] when owner or repo is missing.
    pub fn repo_ref(&self) -> Result<RepoRef, AuditError> {
        match (&self.github.owner, &self.github.repo) {
            (Some(owner), Some(repo)) => Ok(RepoRef::new(owner, repo)),
            _ => Err(AuditError::Config(
                "GITHUB_OWNER and GITHUB_REPO must both be set (or pass --repo owner/repo)".into(),
            )),
        }
    }

    /// Check everything the GRC submission stage needs.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Config`] naming the first missing setting.
    pub fn validate_for_submission(&self) -> Result<(), AuditError> {
        if self.grc.api_token.is_none() {
            return Err(AuditError::Config(
                "ERAMBA_API_TOKEN not set; it is required to submit evidence".into(),
            ));
        }
        if self.grc.control_id.trim().is_empty() {
            return Err(AuditError::Config("control id must not be empty".into()));
        }
        if !(self.grc.url.starts_with("http://") || self.grc.url.starts_with("https://")) {
            return Err(AuditError::Config(format!(
                "ERAMBA_URL must be an http(s) URL, got '{}'",
                self.grc.url
            )));
        }
        Ok(())
    }
}

/// GitHub REST API settings.
///
/// # Examples
///
/// ```
/// use revguard_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.api_url, "https://api.github.com");
/// assert_eq!(config.max_pages, None);
/// assert_eq!(config.effective_per_page(), 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Bearer token; unauthenticated requests work for public repositories
    /// at a much lower rate limit.
    pub token: Option<String>,
    /// Repository owner.
    pub owner: Option<String>,
    /// Repository name.
    pub repo: Option<String>,
    /// Page size for the pull request listing (default: 50).
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// API root, overridable for GitHub Enterprise.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Stop after this many listing pages; `None` follows every page.
    pub max_pages: Option<u32>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent review fetches (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl GitHubConfig {
    /// Page size clamped to the range GitHub accepts (1..=100).
    pub fn effective_per_page(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }
}

fn default_per_page() -> u32 {
    50
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            per_page: default_per_page(),
            api_url: default_github_api_url(),
            max_pages: None,
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

/// Eramba evidence store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrcConfig {
    /// Eramba base URL.
    #[serde(default = "default_grc_url")]
    pub url: String,
    /// Bearer token for the Eramba API.
    pub api_token: Option<String>,
    /// Control the evidence is filed under (default: `CTRL-1234`).
    #[serde(default = "default_control_id")]
    pub control_id: String,
    /// Value of the `source` field on report evidence (default: `Erambot`).
    #[serde(default = "default_source")]
    pub source: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds (default: 500).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_grc_url() -> String {
    "https://eramba.company.com".into()
}

fn default_control_id() -> String {
    "CTRL-1234".into()
}

fn default_source() -> String {
    "Erambot".into()
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    500
}

impl Default for GrcConfig {
    fn default() -> Self {
        Self {
            url: default_grc_url(),
            api_token: None,
            control_id: default_control_id(),
            source: default_source(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Report output settings.
///
/// # Examples
///
/// ```
/// use revguard_core::ReportConfig;
///
/// let config = ReportConfig::default();
/// assert!(config.pdf_path().ends_with("pr_compliance_report.pdf"));
/// assert!(!config.keep_chart);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory the PDF and chart are written to (default: `.`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// PDF file name.
    #[serde(default = "default_pdf_name")]
    pub pdf_name: String,
    /// Chart image file name.
    #[serde(default = "default_chart_name")]
    pub chart_name: String,
    /// Keep the chart image after the PDF is written (default: false).
    #[serde(default)]
    pub keep_chart: bool,
}

impl ReportConfig {
    /// Full path of the PDF document.
    pub fn pdf_path(&self) -> PathBuf {
        self.output_dir.join(&self.pdf_name)
    }

    /// Full path of the chart image.
    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join(&self.chart_name)
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_pdf_name() -> String {
    "pr_compliance_report.pdf".into()
}

fn default_chart_name() -> String {
    "pr_compliance_pie.png".into()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            pdf_name: default_pdf_name(),
            chart_name: default_chart_name(),
            keep_chart: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = AuditConfig::default();
        assert_eq!(config.github.per_page, 50);
        assert_eq!(config.github.timeout_secs, 30);
        assert_eq!(config.github.concurrency, 4);
        assert!(config.github.token.is_none());
        assert_eq!(config.grc.url, "https://eramba.company.com");
        assert_eq!(config.grc.control_id, "CTRL-1234");
        assert_eq!(config.grc.source, "Erambot");
        assert_eq!(config.grc.max_retries, 2);
        assert_eq!(config.grc.backoff_base_ms, 500);
        assert_eq!(config.report.output_dir, PathBuf::from("."));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = AuditConfig::from_toml("").unwrap();
        assert_eq!(config.github.per_page, 50);
        assert_eq!(config.grc.control_id, "CTRL-1234");
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[github]
owner = "acme"
repo = "api"
per_page = 25
max_pages = 4
api_url = "https://ghe.acme.internal/api/v3"

[grc]
url = "https://grc.acme.internal"
control_id = "CTRL-77"
max_retries = 0

[report]
output_dir = "out"
keep_chart = true
"#;
        let config = AuditConfig::from_toml(toml).unwrap();
        assert_eq!(config.github.per_page, 25);
        assert_eq!(config.github.max_pages, Some(4));
        assert_eq!(config.github.api_url, "https://ghe.acme.internal/api/v3");
        assert_eq!(config.grc.control_id, "CTRL-77");
        assert_eq!(config.grc.max_retries, 0);
        assert_eq!(config.report.pdf_path(), PathBuf::from("out/pr_compliance_report.pdf"));
        assert!(config.report.keep_chart);
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(AuditConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AuditConfig::from_toml("[github]\nowner = \"file-owner\"\n").unwrap();
        config
            .apply_env(env(&[
                ("GITHUB_OWNER", "env-owner"),
                ("GITHUB_REPO", "svc"),
                ("GITHUB_PER_PAGE", "75"),
                ("GITHUB_TOKEN", "ghp_x"),
                ("ERAMBA_URL", "https://grc.example"),
                ("ERAMBA_API_TOKEN", "tok"),
            ]))
            .unwrap();
        assert_eq!(config.github.owner.as_deref(), Some("env-owner"));
        assert_eq!(config.github.per_page, 75);
        assert_eq!(config.github.token.as_deref(), Some("ghp_x"));
        assert_eq!(config.grc.url, "https://grc.example");
        assert_eq!(config.grc.api_token.as_deref(), Some("tok"));
        assert_eq!(config.repo_ref().unwrap().to_string(), "env-owner/svc");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = AuditConfig::default();
        config
            .apply_env(env(&[("ERAMBA_CONTROL_ID", ""), ("GITHUB_PER_PAGE", " ")]))
            .unwrap();
        assert_eq!(config.grc.control_id, "CTRL-1234");
        assert_eq!(config.github.per_page, 50);
    }

    #[test]
    fn invalid_per_page_is_config_error() {
        let mut config = AuditConfig::default();
        let err = config
            .apply_env(env(&[("GITHUB_PER_PAGE", "fifty")]))
            .unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn zero_per_page_is_config_error() {
        let mut config = AuditConfig::default();
        let err = config
            .apply_env(env(&[("GITHUB_PER_PAGE", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("positive integer"));
        assert_eq!(config.github.per_page, 50);
    }

    #[test]
    fn per_page_is_clamped() {
        let mut github = GitHubConfig {
            per_page: 500,
            ..GitHubConfig::default()
        };
        assert_eq!(github.effective_per_page(), 100);
        github.per_page = 0;
        assert_eq!(github.effective_per_page(), 1);
    }

    #[test]
    fn repo_ref_requires_owner_and_repo() {
        let mut config = AuditConfig::default();
        config.github.owner = Some("acme".into());
        assert!(config.repo_ref().is_err());
    }

    #[test]
    fn submission_requires_token_and_http_url() {
        let mut config = AuditConfig::default();
        assert!(config.validate_for_submission().is_err());
        config.grc.api_token = Some("tok".into());
        assert!(config.validate_for_submission().is_ok());
        config.grc.url = "ftp://nope".into();
        assert!(config.validate_for_submission().is_err());
    }
}

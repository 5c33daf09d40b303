use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revguard_core::{
    body_excerpt, AuditError, ChangeListing, GitHubConfig, Identity, MergedChange, RepoRef,
    Review,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::pagination::next_link;
use crate::ReviewSource;

/// Page size used for review listings; GitHub's maximum.
const REVIEWS_PER_PAGE: u32 = 100;

/// GitHub REST client for pull request and review listings.
///
/// Every non-2xx response, network error, or timeout becomes
/// [`AuditError::UpstreamUnavailable`].
///
/// # Examples
///
/// ```
/// use revguard_core::GitHubConfig;
/// use revguard_source::github::GitHubSource;
///
/// let source = GitHubSource::new(&GitHubConfig::default()).unwrap();
/// assert_eq!(
///     source.pulls_url(&"octocat/hello-world".parse().unwrap()),
///     "https://api.github.com/repos/octocat/hello-world/pulls?state=closed&per_page=50"
/// );
/// ```
pub struct GitHubSource {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
    per_page: u32,
    max_pages: Option<u32>,
}

impl GitHubSource {
    /// Create a client from GitHub settings.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, AuditError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("revguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuditError::Config(format!("failed to create GitHub client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            per_page: config.effective_per_page(),
            max_pages: config.max_pages,
        })
    }

    /// First-page URL of the closed pull request listing.
    pub fn pulls_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/repos/{}/{}/pulls?state=closed&per_page={}",
            self.api_url, repo.owner, repo.repo, self.per_page
        )
    }

    /// First-page URL of a pull request's review listing.
    pub fn reviews_url(&self, repo: &RepoRef, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{number}/reviews?per_page={REVIEWS_PER_PAGE}",
            self.api_url, repo.owner, repo.repo
        )
    }

    /// Fetch one page and return its items plus the next-page URL.
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(Vec<T>, Option<String>), AuditError> {
        tracing::debug!(%url, "GET");

        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AuditError::upstream(None, format!("GET {url} timed out"))
            } else {
                AuditError::upstream(None, format!("GET {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        let rate_limited = is_rate_limited(status.as_u16(), response.headers());
        let next = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let mut message = format!("GitHub API error {status} for GET {url}");
            if rate_limited {
                message.push_str(" (rate limit exhausted)");
            }
            let excerpt = body_excerpt(&body);
            if !excerpt.is_empty() {
                message.push_str(": ");
                message.push_str(&excerpt);
            }
            return Err(AuditError::upstream(Some(status.as_u16()), message));
        }

        let items: Vec<T> = response.json().await.map_err(|e| {
            AuditError::upstream(
                Some(status.as_u16()),
                format!("unexpected response body from GET {url}: {e}"),
            )
        })?;

        Ok((items, next))
    }
}

#[async_trait]
impl ReviewSource for GitHubSource {
    async fn list_merged_changes(&self, repo: &RepoRef) -> Result<ChangeListing, AuditError> {
        let mut listing = ChangeListing::default();
        let mut url = Some(self.pulls_url(repo));

        while let Some(current) = url.take() {
            if self.max_pages.is_some_and(|max| listing.pages_fetched >= max) {
                tracing::warn!(
                    %repo,
                    pages = listing.pages_fetched,
                    "page limit reached with more pull requests available; results are truncated"
                );
                listing.truncated = true;
                break;
            }

            let (page, next) = self.get_page::<PullRequestPayload>(&current).await?;
            listing.pages_fetched += 1;
            listing
                .changes
                .extend(page.into_iter().filter_map(PullRequestPayload::into_merged_change));
            url = next;
        }

        let dropped = listing.dedup();
        if !dropped.is_empty() {
            tracing::debug!(%repo, ?dropped, "dropped pull requests repeated across pages");
        }
        tracing::debug!(
            %repo,
            merged = listing.changes.len(),
            pages = listing.pages_fetched,
            "listed merged pull requests"
        );
        Ok(listing)
    }

    async fn list_reviews(&self, repo: &RepoRef, change_id: u64) -> Result<Vec<Review>, AuditError> {
        let mut reviews = Vec::new();
        let mut url = Some(self.reviews_url(repo, change_id));

        while let Some(current) = url.take() {
            let (page, next) = self.get_page::<ReviewPayload>(&current).await?;
            reviews.extend(page.into_iter().map(|r| r.into_review(change_id)));
            url = next;
        }

        Ok(reviews)
    }
}

/// Subset of the GitHub pull request object the audit needs.
#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestPayload {
    number: u64,
    #[serde(default)]
    title: String,
    user: Option<UserPayload>,
    merged_at: Option<DateTime<Utc>>,
}

impl PullRequestPayload {
    /// `None` for pull requests that were closed without merging.
    pub(crate) fn into_merged_change(self) -> Option<MergedChange> {
        let merged_at = self.merged_at?;
        Some(MergedChange {
            id: self.number,
            title: self.title,
            author: UserPayload::identity(self.user),
            merged_at,
        })
    }
}

/// Subset of the GitHub review object the audit needs.
#[derive(Debug, Deserialize)]
pub(crate) struct ReviewPayload {
    state: String,
    user: Option<UserPayload>,
    submitted_at: Option<DateTime<Utc>>,
}

impl ReviewPayload {
    pub(crate) fn into_review(self, change_id: u64) -> Review {
        Review {
            change_id,
            reviewer: UserPayload::identity(self.user),
            state: self.state.into(),
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserPayload {
    login: String,
}

impl UserPayload {
    /// Deleted accounts come back as `null`; GitHub renders them as `ghost`.
    fn identity(user: Option<Self>) -> Identity {
        user.map(|u| Identity::new(u.login))
            .unwrap_or_else(Identity::ghost)
    }
}

fn is_rate_limited(status: u16, headers: &reqwest::header::HeaderMap) -> bool {
    (status == 403 || status == 429)
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

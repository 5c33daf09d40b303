use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use revguard_core::{
    body_excerpt, Acknowledgement, AuditError, EvidenceRecord, EvidenceType, GrcConfig,
    ReportArtifact,
};
use serde::Serialize;
use serde_json::Value;

use crate::idempotency::idempotency_key;
use crate::retry::{with_retry, RetryPolicy};
use crate::EvidenceSink;

/// The only status that counts as an accepted submission.
const CREATED: u16 = 201;

/// Header carrying the deduplication token.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Subject used when keying the report upload.
const REPORT_SUBJECT: &str = "report";

/// Eramba evidence API client.
///
/// Submissions go to `POST {url}/api/controls/{control_id}/evidences`, either
/// as a JSON object or as a multipart form with the report attached. Every
/// submission carries an [`IDEMPOTENCY_HEADER`] that stays the same across
/// its retries.
///
/// # Examples
///
/// ```
/// use revguard_core::GrcConfig;
/// use revguard_evidence::ErambaClient;
///
/// let config = GrcConfig {
///     url: "https://grc.example/".into(),
///     api_token: Some("secret".into()),
///     ..GrcConfig::default()
/// };
/// let client = ErambaClient::new(&config).unwrap();
/// assert_eq!(
///     client.evidences_url("CTRL-1234"),
///     "https://grc.example/api/controls/CTRL-1234/evidences"
/// );
/// ```
pub struct ErambaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    source: String,
    policy: RetryPolicy,
    run_started_at: DateTime<Utc>,
}

impl ErambaClient {
    /// Create a client from GRC settings.
    ///
    /// The run start time used for idempotency keys defaults to now; see
    /// [`ErambaClient::with_run_started_at`].
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Config`] if the API token is missing or the HTTP
    /// client cannot be built.
    pub fn new(config: &GrcConfig) -> Result<Self, AuditError> {
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| AuditError::Config("ERAMBA_API_TOKEN not set".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("revguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuditError::Config(format!("failed to create GRC client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token,
            source: config.source.clone(),
            policy: RetryPolicy::from_config(config),
            run_started_at: Utc::now(),
        })
    }

    /// Pin the run start time that idempotency keys are derived from.
    #[must_use]
    pub fn with_run_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_started_at = at;
        self
    }

    /// Override the retry policy from the configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Evidence endpoint for one control.
    pub fn evidences_url(&self, control_id: &str) -> String {
        format!("{}/api/controls/{control_id}/evidences", self.base_url)
    }

    /// Send one prepared request and interpret the answer.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        key: &str,
    ) -> Result<Value, AuditError> {
        tracing::debug!(%url, idempotency_key = key, "POST");

        let response = request
            .bearer_auth(&self.token)
            .header(IDEMPOTENCY_HEADER, key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuditError::submission(None, format!("POST {url} timed out"))
                } else {
                    AuditError::submission(None, format!("POST {url} failed: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        acknowledge(status, &body, url)
    }
}

/// Wire shape of a structured submission.
#[derive(Debug, Serialize)]
struct EvidencePayload<'a> {
    timestamp: String,
    evidence_type: EvidenceType,
    description: &'a str,
    source: &'a str,
    content: &'a Value,
}

impl<'a> From<&'a EvidenceRecord> for EvidencePayload<'a> {
    fn from(record: &'a EvidenceRecord) -> Self {
        Self {
            timestamp: wire_timestamp(record.timestamp),
            evidence_type: record.evidence_type,
            description: &record.description,
            source: &record.source,
            content: &record.content,
        }
    }
}

#[async_trait]
impl EvidenceSink for ErambaClient {
    async fn submit_structured(
        &self,
        control_id: &str,
        record: &EvidenceRecord,
    ) -> Result<Acknowledgement, AuditError> {
        let url = self.evidences_url(control_id);
        let key = record.idempotency_key.clone().unwrap_or_else(|| {
            idempotency_key(control_id, &record.description, self.run_started_at)
        });
        let payload = EvidencePayload::from(record);

        let (body, attempts) = with_retry(self.policy, |_| {
            self.send(self.http.post(&url).json(&payload), &url, &key)
        })
        .await?;

        tracing::info!(control_id, evidence_type = %record.evidence_type, attempts, "evidence submitted");
        Ok(Acknowledgement {
            status: CREATED,
            body,
            attempts,
        })
    }

    async fn submit_artifact(
        &self,
        control_id: &str,
        artifact: &ReportArtifact,
        description: &str,
    ) -> Result<Acknowledgement, AuditError> {
        let url = self.evidences_url(control_id);
        let key = idempotency_key(control_id, REPORT_SUBJECT, self.run_started_at);
        let bytes = tokio::fs::read(artifact.path()).await.map_err(|e| {
            AuditError::submission(
                None,
                format!("failed to read report {}: {e}", artifact.path().display()),
            )
        })?;
        let file_name = artifact.file_name();
        let mime = artifact.format.mime_type();
        let timestamp = wire_timestamp(Utc::now());

        // Forms are consumed on send, so each attempt builds its own.
        let (body, attempts) = with_retry(self.policy, |_| {
            let form = Part::bytes(bytes.clone())
                .file_name(file_name.clone())
                .mime_str(mime)
                .map(|file| {
                    Form::new()
                        .text("timestamp", timestamp.clone())
                        .text("evidence_type", EvidenceType::Report.to_string())
                        .text("description", description.to_string())
                        .text("source", self.source.clone())
                        .part("file", file)
                });
            let url = url.as_str();
            let key = key.as_str();
            async move {
                let form = form.map_err(|e| {
                    AuditError::Config(format!("invalid upload MIME type: {e}"))
                })?;
                self.send(self.http.post(url).multipart(form), url, key).await
            }
        })
        .await?;

        tracing::info!(
            control_id,
            file = %file_name,
            size_bytes = bytes.len(),
            attempts,
            "report uploaded"
        );
        Ok(Acknowledgement {
            status: CREATED,
            body,
            attempts,
        })
    }
}

fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accept only 201; parse the body leniently.
fn acknowledge(status: u16, body: &str, url: &str) -> Result<Value, AuditError> {
    if status == CREATED {
        return Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())));
    }
    let mut message = format!("GRC API returned {status} for POST {url}");
    let excerpt = body_excerpt(body);
    if !excerpt.is_empty() {
        message.push_str(": ");
        message.push_str(&excerpt);
    }
    Err(AuditError::submission(Some(status), message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use revguard_core::ArtifactFormat;
    use serde_json::json;

    fn client(url: &str) -> ErambaClient {
        ErambaClient::new(&GrcConfig {
            url: url.into(),
            api_token: Some("t0ken".into()),
            timeout_secs: 2,
            ..GrcConfig::default()
        })
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 1,
            backoff_base_ms: 1,
        })
    }

    fn record() -> EvidenceRecord {
        EvidenceRecord {
            control_id: "CTRL-1234".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            evidence_type: EvidenceType::ApprovalRecord,
            description: "Pull request #2 (Tweak CI) merged by carol without external approval."
                .into(),
            source: "GitHub API".into(),
            content: json!({"pr_id": 2, "author": "carol", "merged_at": "2024-05-01T00:00:00Z"}),
            idempotency_key: None,
        }
    }

    #[test]
    fn missing_token_is_config_error() {
        let err = ErambaClient::new(&GrcConfig::default()).err().unwrap();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn only_201_is_accepted() {
        let url = "https://grc.example/api/controls/C/evidences";
        assert_eq!(
            acknowledge(201, r#"{"id": 7}"#, url).unwrap(),
            json!({"id": 7})
        );
        assert_eq!(
            acknowledge(201, "created", url).unwrap(),
            Value::String("created".into())
        );

        let err = acknowledge(200, "{}", url).unwrap_err();
        assert_eq!(err.status(), Some(200));

        let err = acknowledge(500, "Internal Server Error", url).unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("Internal Server Error"));
    }

    #[test]
    fn structured_payload_wire_shape() {
        let record = record();
        let value = serde_json::to_value(EvidencePayload::from(&record)).unwrap();
        assert_eq!(value["timestamp"], "2024-06-01T12:00:00Z");
        assert_eq!(value["evidence_type"], "approval_record");
        assert_eq!(value["source"], "GitHub API");
        assert_eq!(value["content"]["pr_id"], 2);
        assert!(value.get("control_id").is_none());
        assert!(value.get("idempotency_key").is_none());
    }

    #[tokio::test]
    async fn unreachable_grc_is_submission_failure() {
        let c = client("http://127.0.0.1:9");
        let err = c.submit_structured("CTRL-1234", &record()).await.unwrap_err();
        assert!(matches!(err, AuditError::SubmissionFailure { status: None, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn missing_artifact_fails_without_network() {
        let c = client("http://127.0.0.1:9");
        let artifact = ReportArtifact {
            format: ArtifactFormat::Pdf,
            path: "/nonexistent/revguard/report.pdf".into(),
            chart_path: None,
            size_bytes: 0,
        };
        let err = c
            .submit_artifact("CTRL-1234", &artifact, "Automated PR compliance PDF report")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read report"));
    }
}

//! Audit orchestration.
//!
//! [`AuditRunner`] drives one audit run through its stages:
//!
//! 1. **Fetching** merged changes from the [`ReviewSource`]
//! 2. **Evaluating** them against their reviews (fetched concurrently, in
//!    source order)
//! 3. **Rendering** the report through the [`ReportRenderer`]
//! 4. **Submitting** the report and one record per violation to the
//!    [`EvidenceSink`]
//!
//! Source and render errors stop the run before anything is submitted.
//! Submission errors are tallied per record and never stop the loop.

pub mod evidence;
pub mod state;
pub mod summary;

pub use state::{NoopObserver, RunObserver, RunState};
pub use summary::{RunOutcome, RunSummary, SubmissionFailureRecord};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use revguard_compliance::{aggregate, ViolationSummary};
use revguard_core::{
    AuditConfig, AuditError, Clock, ComplianceResult, RepoRef, Review, SystemClock,
};
use revguard_evidence::EvidenceSink;
use revguard_report::summary::ReportSummary;
use revguard_report::ReportRenderer;
use revguard_source::ReviewSource;

use crate::evidence::{violation_record, REPORT_DESCRIPTION};

/// Per-run settings.
///
/// # Examples
///
/// ```
/// use revguard_core::AuditConfig;
/// use revguard_runner::RunOptions;
///
/// let options = RunOptions::from_config(&AuditConfig::default(), true);
/// assert_eq!(options.control_id, "CTRL-1234");
/// assert_eq!(options.concurrency, 4);
/// assert!(options.dry_run);
/// ```
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Control the evidence is filed under.
    pub control_id: String,
    /// Concurrent review fetches; values below 1 are treated as 1.
    pub concurrency: usize,
    /// Stop after rendering.
    pub dry_run: bool,
}

impl RunOptions {
    /// Options taken from the loaded configuration.
    pub fn from_config(config: &AuditConfig, dry_run: bool) -> Self {
        Self {
            control_id: config.grc.control_id.clone(),
            concurrency: config.github.concurrency,
            dry_run,
        }
    }
}

/// Orchestrates an audit run over pluggable source, renderer, and sink.
pub struct AuditRunner {
    source: Arc<dyn ReviewSource>,
    renderer: Arc<dyn ReportRenderer>,
    sink: Option<Arc<dyn EvidenceSink>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn RunObserver>,
    run_started_at: Option<DateTime<Utc>>,
    options: RunOptions,
}

impl AuditRunner {
    /// Create a runner without an evidence sink.
    ///
    /// Attach one with [`AuditRunner::with_sink`] before a non-dry run.
    pub fn new(
        source: Arc<dyn ReviewSource>,
        renderer: Arc<dyn ReportRenderer>,
        options: RunOptions,
    ) -> Self {
        Self {
            source,
            renderer,
            sink: None,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
            run_started_at: None,
            options,
        }
    }

    /// Attach the evidence sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EvidenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the wall clock used for evidence timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Pin the run start that violation idempotency keys are derived from.
    ///
    /// Use the same instant the evidence sink keys its report upload with.
    /// Without it each run takes the clock's time when it starts.
    #[must_use]
    pub fn with_run_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.run_started_at = Some(at);
        self
    }

    /// Run options in effect.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Fetch and evaluate without rendering or submitting.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::UpstreamUnavailable`] if any listing fails.
    pub async fn evaluate(&self, repo: &RepoRef) -> Result<ComplianceResult, AuditError> {
        self.observer.on_state(RunState::Fetching);
        let mut listing = self.source.list_merged_changes(repo).await?;
        let dropped = listing.dedup();
        if !dropped.is_empty() {
            tracing::debug!(%repo, ?dropped, "dropped repeated merged changes");
        }
        tracing::info!(
            %repo,
            merged = listing.changes.len(),
            pages = listing.pages_fetched,
            truncated = listing.truncated,
            "fetched merged changes"
        );

        self.observer.on_state(RunState::Evaluating);
        let total = listing.changes.len();
        let mut fetched = stream::iter(listing.changes.iter().map(|change| {
            let id = change.id;
            async move { self.source.list_reviews(repo, id).await.map(|r| (id, r)) }
        }))
        .buffered(self.options.concurrency.max(1));

        let mut reviews: HashMap<u64, Vec<Review>> = HashMap::with_capacity(total);
        let mut done = 0;
        while let Some(next) = fetched.next().await {
            let (id, list) = next?;
            reviews.insert(id, list);
            done += 1;
            self.observer.on_reviews_fetched(done, total);
        }
        drop(fetched);

        let mut result = aggregate(listing.changes, |id| {
            reviews.get(&id).map(Vec::as_slice).unwrap_or_default()
        });
        result.truncated = listing.truncated;
        tracing::info!(
            compliant = result.compliant.len(),
            violations = result.violations.len(),
            "evaluated merged changes"
        );
        Ok(result)
    }

    /// Run the whole pipeline.
    ///
    /// Never returns an error: fatal failures end in [`RunState::Failed`]
    /// with the cause in [`RunOutcome::error`].
    pub async fn run(&self, repo: &RepoRef) -> RunOutcome {
        let started_at = self.run_started_at.unwrap_or_else(|| self.clock.now());
        let mut summary =
            RunSummary::new(repo.to_string(), &self.options.control_id, self.options.dry_run);

        if !self.options.dry_run && self.sink.is_none() {
            return self.fail(
                summary,
                AuditError::Config("no evidence sink configured for a submitting run".into()),
            );
        }

        let result = match self.evaluate(repo).await {
            Ok(result) => result,
            Err(err) => return self.fail(summary, err),
        };
        summary.report = Some(ReportSummary::from_result(&result));
        summary.violations = ViolationSummary::all(&result);

        self.transition(&mut summary, RunState::Rendering);
        let artifact = match self.renderer.render(&result) {
            Ok(artifact) => artifact,
            Err(err) => return self.fail(summary, err),
        };
        summary.report_path = Some(artifact.path.clone());

        let sink = match (&self.sink, self.options.dry_run) {
            (Some(sink), false) => sink,
            _ => {
                tracing::info!("dry run; skipping evidence submission");
                self.transition(&mut summary, RunState::Done);
                return RunOutcome {
                    summary,
                    error: None,
                };
            }
        };

        self.transition(&mut summary, RunState::Submitting);
        let control_id = self.options.control_id.as_str();

        summary.submissions_attempted += 1;
        match sink
            .submit_artifact(control_id, &artifact, REPORT_DESCRIPTION)
            .await
        {
            Ok(_) => self.observer.on_submission("report", true),
            Err(err) => {
                tracing::warn!(control_id, "failed to submit report: {err}");
                self.observer.on_submission("report", false);
                summary.record_failure("report".into(), &err);
            }
        }

        for verdict in &result.violations {
            let subject = format!("PR #{}", verdict.change().id);
            let record = violation_record(control_id, verdict, self.clock.now(), started_at);
            summary.submissions_attempted += 1;
            match sink.submit_structured(control_id, &record).await {
                Ok(_) => self.observer.on_submission(&subject, true),
                Err(err) => {
                    tracing::warn!(control_id, %subject, "failed to submit evidence: {err}");
                    self.observer.on_submission(&subject, false);
                    summary.record_failure(subject, &err);
                }
            }
        }

        tracing::info!(
            attempted = summary.submissions_attempted,
            failed = summary.submissions_failed,
            "evidence submission finished"
        );
        self.transition(&mut summary, RunState::Done);
        RunOutcome {
            summary,
            error: None,
        }
    }

    fn transition(&self, summary: &mut RunSummary, state: RunState) {
        summary.state = state;
        self.observer.on_state(state);
    }

    fn fail(&self, mut summary: RunSummary, err: AuditError) -> RunOutcome {
        tracing::error!("audit run failed: {err}");
        summary.error = Some(err.to_string());
        self.transition(&mut summary, RunState::Failed);
        RunOutcome {
            summary,
            error: Some(err),
        }
    }
}

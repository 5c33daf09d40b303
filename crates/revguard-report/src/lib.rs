//! Compliance report rendering.
//!
//! [`PdfReportRenderer`] computes the [`summary::ReportSummary`], draws the
//! proportion chart to a PNG, lays the document out, and writes the PDF. The
//! chart file is an intermediate: it is removed once the PDF is finalized
//! unless the configuration asks to keep it.

pub mod chart;
pub mod pdf;
pub mod summary;

use std::path::Path;

use revguard_compliance::ViolationSummary;
use revguard_core::{
    ArtifactFormat, AuditError, Clock, ComplianceResult, ReportArtifact, ReportConfig,
    SystemClock,
};

use crate::summary::ReportSummary;

/// Turns a compliance result into a report artifact.
pub trait ReportRenderer: Send + Sync {
    /// Render the report for `result`.
    ///
    /// Must succeed for empty results and empty violation lists.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::RenderFailure`] when no valid document can be produced.
    fn render(&self, result: &ComplianceResult) -> Result<ReportArtifact, AuditError>;
}

/// PDF renderer writing into the configured output directory.
///
/// # Examples
///
/// ```no_run
/// use revguard_core::{ComplianceResult, ReportConfig};
/// use revguard_report::{PdfReportRenderer, ReportRenderer};
///
/// let renderer = PdfReportRenderer::new(&ReportConfig::default());
/// let artifact = renderer.render(&ComplianceResult::default()).unwrap();
/// println!("wrote {}", artifact.path.display());
/// ```
pub struct PdfReportRenderer<C: Clock = SystemClock> {
    config: ReportConfig,
    clock: C,
}

impl PdfReportRenderer {
    /// Create a renderer stamped with wall-clock time.
    pub fn new(config: &ReportConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> PdfReportRenderer<C> {
    /// Create a renderer with an explicit clock.
    pub fn with_clock(config: &ReportConfig, clock: C) -> Self {
        Self {
            config: config.clone(),
            clock,
        }
    }
}

impl<C: Clock> ReportRenderer for PdfReportRenderer<C> {
    fn render(&self, result: &ComplianceResult) -> Result<ReportArtifact, AuditError> {
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            AuditError::RenderFailure(format!(
                "failed to create output directory {}: {e}",
                self.config.output_dir.display()
            ))
        })?;

        let summary = ReportSummary::from_result(result);
        let violations = ViolationSummary::all(result);
        let chart_path = self.config.chart_path();
        let pdf_path = self.config.pdf_path();

        let written = chart::write_chart(&chart_path, summary.compliant, summary.violations)
            .and_then(|()| {
                let blocks = pdf::layout(&summary, &violations, self.clock.now());
                pdf::write_pdf(&blocks, &chart_path, &pdf_path)
            });

        let kept_chart = if self.config.keep_chart {
            Some(chart_path.clone())
        } else {
            remove_intermediate(&chart_path);
            None
        };
        written?;

        let size_bytes = std::fs::metadata(&pdf_path)
            .map_err(|e| {
                AuditError::RenderFailure(format!("report {} missing: {e}", pdf_path.display()))
            })?
            .len();
        if size_bytes == 0 {
            return Err(AuditError::RenderFailure(format!(
                "report {} is empty",
                pdf_path.display()
            )));
        }

        tracing::info!(
            path = %pdf_path.display(),
            size_bytes,
            total = summary.total,
            violations = summary.violations,
            "report rendered"
        );

        Ok(ReportArtifact {
            format: ArtifactFormat::Pdf,
            path: pdf_path,
            chart_path: kept_chart,
            size_bytes,
        })
    }
}

fn remove_intermediate(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove chart image: {e}"),
    }
}

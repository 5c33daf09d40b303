use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rgb,
};
use revguard_compliance::ViolationSummary;
use revguard_core::AuditError;

use crate::chart::{CHART_SIZE, COMPLIANT_COLOR, VIOLATION_COLOR};
use crate::summary::{ReportSummary, TRUNCATION_NOTICE};

pub const REPORT_TITLE: &str = "PR Approval Compliance Report";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CHART_WIDTH_MM: f32 = 100.0;
/// Helvetica at 11pt fits roughly this many characters across the text block.
const WRAP_COLUMNS: usize = 88;

/// One element of the report, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Text(String),
    Warning(String),
    Chart,
    Legend { label: String, color: [u8; 3] },
    Spacer(f32),
}

/// Lay out the report content independently of the PDF backend.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use revguard_report::pdf::{layout, Block};
/// use revguard_report::summary::ReportSummary;
///
/// let blocks = layout(&ReportSummary::from_counts(0, 0, false), &[], Utc::now());
/// assert!(blocks.contains(&Block::Text("None".into())));
/// ```
pub fn layout(
    summary: &ReportSummary,
    violations: &[ViolationSummary],
    generated_at: DateTime<Utc>,
) -> Vec<Block> {
    let mut blocks = vec![
        Block::Title(REPORT_TITLE.into()),
        Block::Text(format!(
            "Generated at: {} UTC",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        )),
        Block::Spacer(5.0),
        Block::Heading("Summary".into()),
        Block::Text(summary.total_line()),
        Block::Text(summary.compliant_line()),
        Block::Text(summary.violations_line()),
    ];
    if summary.truncated {
        blocks.push(Block::Warning(format!("Warning: {TRUNCATION_NOTICE}")));
    }
    blocks.push(Block::Spacer(5.0));
    blocks.push(Block::Chart);
    blocks.push(Block::Legend {
        label: format!("Compliant PRs ({:.1}%)", summary.compliant_pct),
        color: COMPLIANT_COLOR.0,
    });
    blocks.push(Block::Legend {
        label: format!("Violations ({:.1}%)", summary.violation_pct),
        color: VIOLATION_COLOR.0,
    });
    blocks.push(Block::Spacer(5.0));
    blocks.push(Block::Heading("Violations".into()));
    if violations.is_empty() {
        blocks.push(Block::Text("None".into()));
    } else {
        for v in violations {
            for line in wrap(&v.to_string(), WRAP_COLUMNS) {
                blocks.push(Block::Text(line));
            }
        }
    }
    blocks
}

/// Write `blocks` to a PDF at `pdf_path`, embedding the PNG at `chart_path`.
///
/// # Errors
///
/// Returns [`AuditError::RenderFailure`] on any font, image, or write error.
pub fn write_pdf(blocks: &[Block], chart_path: &Path, pdf_path: &Path) -> Result<(), AuditError> {
    let (doc, page, layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer);
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| render_err("failed to load Helvetica", e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| render_err("failed to load Helvetica-Bold", e))?;

    let mut writer = PageWriter {
        doc,
        layer,
        y: PAGE_HEIGHT - MARGIN,
        regular,
        bold,
    };

    for block in blocks {
        match block {
            Block::Title(text) => writer.text(text, 16.0, true, 10.0),
            Block::Heading(text) => writer.text(text, 14.0, true, 10.0),
            Block::Text(text) => writer.text(text, 11.0, false, 7.0),
            Block::Warning(text) => {
                writer.set_color(VIOLATION_COLOR.0);
                writer.text(text, 11.0, true, 7.0);
                writer.set_color([0, 0, 0]);
            }
            Block::Legend { label, color } => {
                writer.set_color(*color);
                writer.text(label, 11.0, true, 6.0);
                writer.set_color([0, 0, 0]);
            }
            Block::Spacer(mm) => writer.y -= mm,
            Block::Chart => writer.chart(chart_path)?,
        }
    }

    let file = File::create(pdf_path)?;
    writer
        .doc
        .save(&mut BufWriter::new(file))
        .map_err(|e| render_err("failed to write PDF", e))
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl PageWriter {
    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, advance: f32) {
        self.ensure_room(advance);
        self.y -= advance;
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(winansi(text), size, Mm(MARGIN), Mm(self.y), font);
    }

    fn set_color(&self, [r, g, b]: [u8; 3]) {
        self.layer.set_fill_color(Color::Rgb(Rgb::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            None,
        )));
    }

    fn chart(&mut self, chart_path: &Path) -> Result<(), AuditError> {
        let file = File::open(chart_path)?;
        let decoder = PngDecoder::new(BufReader::new(file))
            .map_err(|e| render_err("failed to decode chart", e))?;
        let image =
            Image::try_from(decoder).map_err(|e| render_err("failed to embed chart", e))?;

        let side_px = CHART_SIZE as f32;
        let dpi = side_px * 25.4 / CHART_WIDTH_MM;
        self.ensure_room(CHART_WIDTH_MM);
        self.y -= CHART_WIDTH_MM;
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(self.y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.y -= 3.0;
        Ok(())
    }
}

fn render_err(context: &str, e: impl std::fmt::Display) -> AuditError {
    AuditError::RenderFailure(format!("{context}: {e}"))
}

/// Built-in PDF fonts only cover WinAnsi; replace anything outside printable
/// Latin-1 so titles with emoji or CJK still produce a valid document.
fn winansi(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap on character columns. Words longer than a line are
/// hard-broken.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let pieces = text.split_whitespace().flat_map(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(columns)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<_>>()
    });
    for piece in pieces {
        let width = piece.chars().count();
        let needed = if current.is_empty() {
            width
        } else {
            current.chars().count() + 1 + width
        };
        if needed > columns && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&piece);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    fn violation(number: u64, title: &str) -> ViolationSummary {
        ViolationSummary {
            number,
            title: title.into(),
            author: "carol".into(),
            merged_at: at(),
        }
    }

    #[test]
    fn layout_contains_summary_and_timestamp() {
        let blocks = layout(&ReportSummary::from_counts(1, 2, false), &[], at());
        assert_eq!(blocks[0], Block::Title(REPORT_TITLE.into()));
        assert!(blocks.contains(&Block::Text("Generated at: 2024-06-01 12:30:00 UTC".into())));
        assert!(blocks.contains(&Block::Text("Total merged PRs: 3".into())));
        assert!(blocks.contains(&Block::Text("Compliant PRs: 1 (33.3%)".into())));
        assert!(blocks.contains(&Block::Text("Violations: 2 (66.7%)".into())));
        assert!(blocks.contains(&Block::Chart));
    }

    #[test]
    fn empty_violation_list_renders_none_marker() {
        let blocks = layout(&ReportSummary::from_counts(3, 0, false), &[], at());
        let heading = blocks
            .iter()
            .position(|b| *b == Block::Heading("Violations".into()))
            .unwrap();
        assert_eq!(blocks[heading + 1], Block::Text("None".into()));
    }

    #[test]
    fn violations_listed_one_per_line() {
        let blocks = layout(
            &ReportSummary::from_counts(0, 2, false),
            &[violation(2, "Tweak CI"), violation(3, "Docs")],
            at(),
        );
        assert!(blocks.contains(&Block::Text(
            "PR #2 (Tweak CI) by carol merged at 2024-06-01T12:30:00Z".into()
        )));
        assert!(!blocks.contains(&Block::Text("None".into())));
    }

    #[test]
    fn truncated_listing_adds_warning() {
        let blocks = layout(&ReportSummary::from_counts(1, 0, true), &[], at());
        assert!(blocks.iter().any(|b| matches!(b, Block::Warning(_))));
    }

    #[test]
    fn wrap_splits_long_lines() {
        let text = "word ".repeat(40);
        let lines = wrap(&text, 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(wrap("", 20), vec![String::new()]);
    }

    #[test]
    fn wrap_breaks_unspaced_words() {
        let title = format!("PR #4 ({}) by alice", "x".repeat(45));
        let lines = wrap(&title, 20);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.concat().replace(' ', ""), title.replace(' ', ""));
        assert_eq!(lines[0], "PR #4");
    }

    #[test]
    fn winansi_replaces_unsupported_chars() {
        assert_eq!(winansi("fix 🐛 café"), "fix ? café");
    }
}

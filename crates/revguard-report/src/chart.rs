//! Two-slice proportion chart (compliant vs. violation) rendered to PNG.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use revguard_core::AuditError;

/// Side length of the square chart image, in pixels.
pub const CHART_SIZE: u32 = 400;

/// Fill of the compliant slice (`#4CAF50`).
pub const COMPLIANT_COLOR: Rgb<u8> = Rgb([0x4C, 0xAF, 0x50]);

/// Fill of the violation slice (`#F44336`).
pub const VIOLATION_COLOR: Rgb<u8> = Rgb([0xF4, 0x43, 0x36]);

/// Fill of the disc when there is nothing to chart.
pub const EMPTY_COLOR: Rgb<u8> = Rgb([0xBD, 0xBD, 0xBD]);

const BACKGROUND: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// The compliant slice starts at 12 o'clock.
const START_ANGLE_DEG: f64 = 90.0;

/// Draw the pie chart for the given counts.
///
/// Slices run counter-clockwise from 12 o'clock: compliant first, then
/// violations. Zero counts yield a grey disc.
///
/// # Examples
///
/// ```
/// use revguard_report::chart::{draw_pie, COMPLIANT_COLOR, CHART_SIZE};
///
/// let img = draw_pie(5, 0);
/// assert_eq!(img.dimensions(), (CHART_SIZE, CHART_SIZE));
/// assert_eq!(*img.get_pixel(CHART_SIZE / 2, CHART_SIZE / 4), COMPLIANT_COLOR);
/// ```
pub fn draw_pie(compliant: usize, violations: usize) -> RgbImage {
    let total = compliant + violations;
    let compliant_sweep = if total == 0 {
        0.0
    } else {
        360.0 * compliant as f64 / total as f64
    };
    let center = f64::from(CHART_SIZE) / 2.0;
    let radius = f64::from(CHART_SIZE) * 0.45;

    RgbImage::from_fn(CHART_SIZE, CHART_SIZE, |x, y| {
        let dx = f64::from(x) + 0.5 - center;
        // Image rows grow downwards; flip so angles are counter-clockwise.
        let dy = center - (f64::from(y) + 0.5);
        if dx * dx + dy * dy > radius * radius {
            return BACKGROUND;
        }
        if total == 0 {
            return EMPTY_COLOR;
        }
        let angle = dy.atan2(dx).to_degrees();
        let offset = (angle - START_ANGLE_DEG).rem_euclid(360.0);
        if offset < compliant_sweep {
            COMPLIANT_COLOR
        } else {
            VIOLATION_COLOR
        }
    })
}

/// Draw the chart and write it to `path` as PNG.
///
/// # Errors
///
/// Returns [`AuditError::RenderFailure`] if the image cannot be encoded or written.
pub fn write_chart(path: &Path, compliant: usize, violations: usize) -> Result<(), AuditError> {
    draw_pie(compliant, violations)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| {
            AuditError::RenderFailure(format!("failed to write chart {}: {e}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: u32 = CHART_SIZE / 2;
    const Q: u32 = CHART_SIZE / 4;

    #[test]
    fn corners_are_background() {
        let img = draw_pie(1, 1);
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*img.get_pixel(CHART_SIZE - 1, CHART_SIZE - 1), BACKGROUND);
    }

    #[test]
    fn half_and_half_splits_left_and_right() {
        // Compliant sweeps counter-clockwise from 12 o'clock: the left half.
        let img = draw_pie(1, 1);
        assert_eq!(*img.get_pixel(C - Q, C), COMPLIANT_COLOR);
        assert_eq!(*img.get_pixel(C + Q, C), VIOLATION_COLOR);
    }

    #[test]
    fn all_violations_is_red() {
        let img = draw_pie(0, 3);
        assert_eq!(*img.get_pixel(C, Q), VIOLATION_COLOR);
        assert_eq!(*img.get_pixel(C - Q, C), VIOLATION_COLOR);
    }

    #[test]
    fn empty_counts_draw_grey_disc() {
        let img = draw_pie(0, 0);
        assert_eq!(*img.get_pixel(C, C), EMPTY_COLOR);
    }

    #[test]
    fn chart_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        write_chart(&path, 1, 2).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn unwritable_path_is_render_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chart.png");
        let err = write_chart(&path, 1, 1).unwrap_err();
        assert!(matches!(err, AuditError::RenderFailure(_)));
    }
}

//! Scroll offset to line window mapping.
//!
//! A [`Viewport`] is always derived fresh from `scroll_top` and the container
//! height; it is never patched incrementally. Given line height `Lh` and
//! buffer margin `B`:
//!
//! ```text
//! first       = floor(scroll_top / Lh)
//! start_line  = max(0, first - B)
//! end_line    = min(total_lines, first + ceil(H / Lh) + B)
//! ```
//!
//! Guarantees for every input (including negative, NaN and past-the-end
//! offsets):
//! * `start_line <= end_line <= total_lines`
//! * `end_line - start_line <= visible_line_count + 2 * buffer_margin`

use std::ops::Range;

use crate::RenderSettings;
use tracing::trace;

/// Half-open run of buffer lines `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineWindow {
    pub start: usize,
    pub end: usize,
}

impl LineWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, line: usize) -> bool {
        line >= self.start && line < self.end
    }
}

impl From<Range<usize>> for LineWindow {
    fn from(r: Range<usize>) -> Self {
        LineWindow::new(r.start, r.end)
    }
}

/// Materialization discipline for a buffer of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Whole buffer placed in batches regardless of scroll position.
    Full,
    /// Only the viewport window is placed; spacers stand in for the rest.
    Virtual,
}

impl RenderMode {
    pub fn for_total(total_lines: usize, full_render_threshold: usize) -> Self {
        if total_lines <= full_render_threshold {
            RenderMode::Full
        } else {
            RenderMode::Virtual
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Full => "full",
            RenderMode::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Clamped scroll offset in pixels.
    pub scroll_top: f64,
    pub container_height: f64,
    pub window: LineWindow,
    pub visible_line_count: usize,
    pub buffer_margin: usize,
}

impl Viewport {
    pub fn compute(
        scroll_top: f64,
        container_height: f64,
        total_lines: usize,
        settings: &RenderSettings,
    ) -> Self {
        let lh = settings.line_height;
        let height = finite_non_negative(container_height);
        let scroll_top = clamp_scroll_top(scroll_top, height, total_lines, lh);
        let visible_line_count = (height / lh).ceil() as usize;
        let first = (scroll_top / lh).floor() as usize;
        let margin = settings.buffer_margin;
        let end = first
            .saturating_add(visible_line_count)
            .saturating_add(margin)
            .min(total_lines);
        let start = first.saturating_sub(margin).min(end);
        trace!(target: "render.viewport", scroll_top, start, end, total_lines, "viewport_computed");
        Self {
            scroll_top,
            container_height: height,
            window: LineWindow { start, end },
            visible_line_count,
            buffer_margin: margin,
        }
    }

    pub fn start_line(&self) -> usize {
        self.window.start
    }

    pub fn end_line(&self) -> usize {
        self.window.end
    }
}

/// Clamp an offset into `[0, max(0, total_lines * Lh - H)]`. Negative and
/// non-finite offsets become 0.
pub fn clamp_scroll_top(scroll_top: f64, container_height: f64, total_lines: usize, lh: f64) -> f64 {
    let max = (total_lines as f64 * lh - finite_non_negative(container_height)).max(0.0);
    finite_non_negative(scroll_top).min(max)
}

fn finite_non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RenderSettings {
        RenderSettings::default()
    }

    #[test]
    fn small_buffer_window_is_whole_buffer() {
        let vp = Viewport::compute(0.0, 600.0, 3, &settings());
        assert_eq!(vp.window, LineWindow::new(0, 3));
        assert_eq!(vp.visible_line_count, 30);
    }

    #[test]
    fn scrolled_window_applies_margin() {
        // 200k lines, scrolled to line 50 with default margin 20.
        let vp = Viewport::compute(50.0 * 20.0, 600.0, 200_000, &settings());
        assert_eq!(vp.start_line(), 30);
        assert_eq!(vp.end_line(), 50 + 30 + 20);
    }

    #[test]
    fn negative_and_nan_offsets_clamp_to_top() {
        for off in [-500.0, f64::NAN, f64::NEG_INFINITY] {
            let vp = Viewport::compute(off, 600.0, 10_000, &settings());
            assert_eq!(vp.scroll_top, 0.0);
            assert_eq!(vp.start_line(), 0);
        }
    }

    #[test]
    fn past_end_clamps_to_last_page() {
        let vp = Viewport::compute(1e12, 600.0, 10_000, &settings());
        assert_eq!(vp.scroll_top, 10_000.0 * 20.0 - 600.0);
        assert_eq!(vp.end_line(), 10_000);
        assert!(vp.window.len() <= vp.visible_line_count + 2 * vp.buffer_margin);
    }

    #[test]
    fn zero_lines_yield_empty_window() {
        let vp = Viewport::compute(100.0, 600.0, 0, &settings());
        assert_eq!(vp.window, LineWindow::new(0, 0));
    }

    #[test]
    fn mode_threshold_is_inclusive() {
        assert_eq!(RenderMode::for_total(5000, 5000), RenderMode::Full);
        assert_eq!(RenderMode::for_total(5001, 5000), RenderMode::Virtual);
    }
}

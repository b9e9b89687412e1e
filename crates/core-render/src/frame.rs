//! Materialized window and its projection to visual nodes.

use std::ops::Range;

use core_events::VisualNode;
use core_text::Line;

use crate::viewport::{LineWindow, RenderMode};

/// Lines currently placed on screen for one buffer.
///
/// `lines[i]` is buffer line `window.start + i`. In full mode the window is
/// the whole buffer and `lines` grows batch by batch until `complete`. In
/// virtual mode `lines` always covers the window exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub mode: RenderMode,
    pub window: LineWindow,
    pub total_lines: usize,
    pub line_height: f64,
    pub lines: Vec<Line>,
}

impl Frame {
    pub fn empty(line_height: f64) -> Self {
        Self {
            mode: RenderMode::Full,
            window: LineWindow::default(),
            total_lines: 0,
            line_height,
            lines: Vec::new(),
        }
    }

    /// Start a batched full-buffer frame with nothing placed yet.
    pub fn full(total_lines: usize, line_height: f64) -> Self {
        Self {
            mode: RenderMode::Full,
            window: LineWindow::new(0, total_lines),
            total_lines,
            line_height,
            lines: Vec::with_capacity(total_lines),
        }
    }

    /// Full-buffer frame placed in one shot (render cache hit).
    pub fn full_restored(lines: Vec<Line>, line_height: f64) -> Self {
        let total_lines = lines.len();
        Self {
            mode: RenderMode::Full,
            window: LineWindow::new(0, total_lines),
            total_lines,
            line_height,
            lines,
        }
    }

    pub fn windowed(window: LineWindow, total_lines: usize, line_height: f64, lines: Vec<Line>) -> Self {
        Self {
            mode: RenderMode::Virtual,
            window,
            total_lines,
            line_height,
            lines,
        }
    }

    pub fn push_batch(&mut self, batch: Vec<Line>) {
        self.lines.extend(batch);
    }

    /// Buffer lines actually present in `lines`.
    pub fn materialized(&self) -> Range<usize> {
        self.window.start..self.window.start + self.lines.len()
    }

    pub fn is_complete(&self) -> bool {
        self.lines.len() >= self.window.len()
    }

    pub fn leading_spacer_px(&self) -> f64 {
        match self.mode {
            RenderMode::Full => 0.0,
            RenderMode::Virtual => self.window.start as f64 * self.line_height,
        }
    }

    pub fn trailing_spacer_px(&self) -> f64 {
        match self.mode {
            RenderMode::Full => 0.0,
            RenderMode::Virtual => {
                self.total_lines.saturating_sub(self.window.end) as f64 * self.line_height
            }
        }
    }

    /// Project to a visual tree: optional leading spacer, one line node per
    /// materialized line, optional trailing spacer.
    pub fn to_nodes(&self) -> VisualNode {
        let mut children = Vec::with_capacity(self.lines.len() + 2);
        let lead = self.leading_spacer_px();
        if lead > 0.0 {
            children.push(VisualNode::spacer(lead));
        }
        children.extend(self.lines.iter().map(|l| VisualNode::line(l.as_str())));
        let trail = self.trailing_spacer_px();
        if trail > 0.0 {
            children.push(VisualNode::spacer(trail));
        }
        VisualNode::group(children)
    }
}

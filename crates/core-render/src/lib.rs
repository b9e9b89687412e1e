//! Windowed rendering of line buffers.
//!
//! Pipeline for one buffer:
//! 1. [`viewport::Viewport::compute`] turns a scroll offset and container
//!    height into a line window (plus margin), clamped to the buffer.
//! 2. [`scheduler::RenderScheduler`] collapses queued requests into one
//!    decision per turn and drops window requests that would re-render the
//!    window already on screen.
//! 3. A [`frame::Frame`] holds the materialized lines. Small buffers
//!    ([`viewport::RenderMode::Full`]) are placed whole in batches paced by
//!    [`scheduler::BatchCursor`]; large ones ([`viewport::RenderMode::Virtual`])
//!    place only the window between two spacers.
//! 4. [`render_cache::RenderCache`] keeps completed full-buffer frames per
//!    path under a soft MB budget.
//! 5. Edits come back as a visual tree and [`reconcile::Reconciler`] maps
//!    them onto the line store.

pub mod frame;
pub mod reconcile;
pub mod render_cache;
pub mod scheduler;
pub mod viewport;

pub use frame::Frame;
pub use reconcile::{Change, Extraction, ReconcileOutcome, Reconciler, extract_content};
pub use render_cache::{PutOutcome, RenderCache};
pub use scheduler::{BatchCursor, Decision, RebuildReason, RenderRequest, RenderScheduler};
pub use viewport::{LineWindow, RenderMode, Viewport};

/// Geometry and pacing knobs shared by every buffer of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Pixel height of one line; always positive.
    pub line_height: f64,
    pub buffer_margin: usize,
    pub full_render_threshold: usize,
    pub batch_size: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            line_height: 20.0,
            buffer_margin: 20,
            full_render_threshold: 5000,
            batch_size: 500,
        }
    }
}

impl RenderSettings {
    pub fn mode_for(&self, total_lines: usize) -> RenderMode {
        RenderMode::for_total(total_lines, self.full_render_threshold)
    }
}

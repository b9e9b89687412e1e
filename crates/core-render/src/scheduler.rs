//! Render scheduler.
//!
//! Producers report what changed (`RenderRequest`) via `mark`. On `consume`
//! the queued requests collapse into one [`Decision`]:
//!
//! - Any `Rebuild` wins; reasons from every queued rebuild are unioned.
//! - Otherwise the most recent `Window` wins. A window equal to the one
//!   already rendered is a no-op and yields no decision at all, which is what
//!   makes repeated scroll events to the same offset idempotent.
//!
//! Full-buffer materialization is paced by [`BatchCursor`], which hands out
//! fixed-size line batches one frame tick at a time.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use bitflags::bitflags;

use crate::viewport::LineWindow;

bitflags! {
    /// Why the window must be derived again from scratch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RebuildReason: u8 {
        const OPEN = 1;
        const RESIZE = 2;
        const STRUCTURAL = 4;
        const ACTIVATE = 8;
        const RELOAD = 16;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderRequest {
    /// Recompute mode, spacers and window; discard any partial materialization.
    Rebuild(RebuildReason),
    /// Viewport moved to this window.
    Window(LineWindow),
}

/// Collapsed outcome of one `consume`.
///
/// `semantic` is the merged request. `effective` is what the controller
/// should execute; a window change before anything was rendered escalates to
/// a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub semantic: RenderRequest,
    pub effective: RenderRequest,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    pending: Vec<RenderRequest>,
    /// Window currently on screen, if any.
    rendered: Option<LineWindow>,
    metrics: SchedulerMetrics,
}

#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    rebuilds: AtomicU64,
    windows: AtomicU64,
    collapsed_windows: AtomicU64,
    suppressed_windows: AtomicU64,
    decisions: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerMetricsSnapshot {
    pub rebuilds: u64,
    pub windows: u64,
    /// Window marks folded into a later one within the same consume.
    pub collapsed_windows: u64,
    /// Window changes dropped because that window was already rendered.
    pub suppressed_windows: u64,
    pub decisions: u64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            rebuilds: self.rebuilds.load(Relaxed),
            windows: self.windows.load(Relaxed),
            collapsed_windows: self.collapsed_windows.load(Relaxed),
            suppressed_windows: self.suppressed_windows.load(Relaxed),
            decisions: self.decisions.load(Relaxed),
        }
    }

    fn incr_semantic(&self, req: &RenderRequest) {
        let counter = match req {
            RenderRequest::Rebuild(_) => &self.rebuilds,
            RenderRequest::Window(_) => &self.windows,
        };
        counter.fetch_add(1, Relaxed);
        self.decisions.fetch_add(1, Relaxed);
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics_snapshot(&self) -> SchedulerMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn mark(&mut self, req: RenderRequest) {
        tracing::trace!(target: "render.scheduler", ?req, "render_mark");
        self.pending.push(req);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Window now on screen. Subsequent requests for it are no-ops.
    pub fn note_rendered(&mut self, window: LineWindow) {
        self.rendered = Some(window);
    }

    pub fn rendered(&self) -> Option<LineWindow> {
        self.rendered
    }

    /// Forget what is on screen so the next window request always renders.
    pub fn forget_rendered(&mut self) {
        self.rendered = None;
    }

    /// Drop queued requests without deciding (tab closed).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.rendered = None;
    }

    pub fn consume(&mut self) -> Option<Decision> {
        if self.pending.is_empty() {
            return None;
        }
        let merged = self.collapse();
        self.pending.clear();
        let merged = match merged {
            RenderRequest::Window(w) if self.rendered == Some(w) => {
                self.metrics.suppressed_windows.fetch_add(1, Relaxed);
                tracing::trace!(target: "render.scheduler", start = w.start, end = w.end, "window_unchanged");
                return None;
            }
            other => other,
        };
        tracing::trace!(target: "render.scheduler", ?merged, "render_collapse");
        self.metrics.incr_semantic(&merged);
        let effective = match &merged {
            RenderRequest::Window(_) if self.rendered.is_none() => {
                RenderRequest::Rebuild(RebuildReason::empty())
            }
            other => other.clone(),
        };
        Some(Decision {
            semantic: merged,
            effective,
        })
    }

    fn collapse(&self) -> RenderRequest {
        let mut reasons: Option<RebuildReason> = None;
        let mut window: Option<LineWindow> = None;
        let mut window_marks = 0u64;
        for req in &self.pending {
            match req {
                RenderRequest::Rebuild(r) => {
                    reasons = Some(reasons.unwrap_or_default() | *r);
                }
                RenderRequest::Window(w) => {
                    window_marks += 1;
                    window = Some(*w);
                }
            }
        }
        if let Some(reasons) = reasons {
            return RenderRequest::Rebuild(reasons);
        }
        match window {
            Some(w) => {
                if window_marks > 1 {
                    self.metrics
                        .collapsed_windows
                        .fetch_add(window_marks - 1, Relaxed);
                }
                RenderRequest::Window(w)
            }
            // Unreachable with a non-empty queue.
            None => RenderRequest::Rebuild(RebuildReason::empty()),
        }
    }
}

/// Paces full-buffer materialization in fixed-size batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCursor {
    next: usize,
    total: usize,
    batch_size: usize,
}

impl BatchCursor {
    pub fn new(total: usize, batch_size: usize) -> Self {
        Self {
            next: 0,
            total,
            batch_size: batch_size.max(1),
        }
    }

    /// Next line range to place, or `None` once everything is placed.
    pub fn next_batch(&mut self) -> Option<Range<usize>> {
        if self.next >= self.total {
            return None;
        }
        let end = (self.next + self.batch_size).min(self.total);
        let range = self.next..end;
        self.next = end;
        Some(range)
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(start: usize, end: usize) -> LineWindow {
        LineWindow::new(start, end)
    }

    #[test]
    fn rebuild_overrides_and_unions_reasons() {
        let mut s = RenderScheduler::new();
        s.mark(RenderRequest::Rebuild(RebuildReason::RESIZE));
        s.mark(RenderRequest::Window(w(0, 10)));
        s.mark(RenderRequest::Rebuild(RebuildReason::STRUCTURAL));
        assert_eq!(
            s.collapse(),
            RenderRequest::Rebuild(RebuildReason::RESIZE | RebuildReason::STRUCTURAL)
        );
    }

    #[test]
    fn latest_window_wins() {
        let mut s = RenderScheduler::new();
        s.note_rendered(w(0, 10));
        s.mark(RenderRequest::Window(w(5, 15)));
        s.mark(RenderRequest::Window(w(9, 19)));
        let d = s.consume().unwrap();
        assert_eq!(d.semantic, RenderRequest::Window(w(9, 19)));
        assert_eq!(d.effective, RenderRequest::Window(w(9, 19)));
        assert_eq!(s.metrics_snapshot().collapsed_windows, 1);
    }

    #[test]
    fn same_window_is_a_noop() {
        let mut s = RenderScheduler::new();
        s.note_rendered(w(30, 100));
        s.mark(RenderRequest::Window(w(30, 100)));
        assert!(s.consume().is_none());
        assert_eq!(s.metrics_snapshot().suppressed_windows, 1);
        assert_eq!(s.metrics_snapshot().decisions, 0);
    }

    #[test]
    fn cold_window_escalates_to_rebuild() {
        let mut s = RenderScheduler::new();
        s.mark(RenderRequest::Window(w(0, 10)));
        let d = s.consume().unwrap();
        assert_eq!(d.semantic, RenderRequest::Window(w(0, 10)));
        assert_eq!(d.effective, RenderRequest::Rebuild(RebuildReason::empty()));
    }

    #[test]
    fn consume_drains_the_queue() {
        let mut s = RenderScheduler::new();
        s.note_rendered(w(0, 10));
        s.mark(RenderRequest::Window(w(3, 13)));
        let d = s.consume().unwrap();
        assert_eq!(d.semantic, RenderRequest::Window(w(3, 13)));
        assert!(!s.has_pending());
        assert!(s.consume().is_none(), "second consume empty");
    }

    #[test]
    fn batches_cover_everything_once() {
        let mut c = BatchCursor::new(1234, 500);
        assert_eq!(c.next_batch(), Some(0..500));
        assert_eq!(c.next_batch(), Some(500..1000));
        assert_eq!(c.next_batch(), Some(1000..1234));
        assert!(c.is_done());
        assert_eq!(c.next_batch(), None);
    }

    #[test]
    fn zero_batch_size_still_progresses() {
        let mut c = BatchCursor::new(2, 0);
        assert_eq!(c.next_batch(), Some(0..1));
        assert_eq!(c.next_batch(), Some(1..2));
    }
}

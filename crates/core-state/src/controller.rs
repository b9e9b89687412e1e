//! One open tab: line store, viewport, scheduling and materialized frame.
//!
//! Lifecycle: `Ready -> Rendering(window) -> Ready -> ... -> Closed`. Opening
//! happens before a controller exists; a controller is only built from
//! content that loaded successfully.
//!
//! Memory-backed buffers read synchronously. Remote-backed buffers answer
//! from their resident window and otherwise hand out a [`FetchRequest`]. Only
//! one fetch is in flight per tab: a new window cancels the previous fetch,
//! and a result whose ticket is not the in-flight one is dropped.

use std::path::{Path, PathBuf};

use core_events::{LinesLoaded, Ticket, VisualNode};
use core_render::scheduler::SchedulerMetricsSnapshot;
use core_render::{
    BatchCursor, Change, Frame, LineWindow, RebuildReason, Reconciler, RenderMode, RenderRequest,
    RenderScheduler, RenderSettings, Viewport,
};
use core_text::{
    Language, Line, LineEnding, LineStore, MemoryLineStore, RangeRead, RemoteLineStore,
    RemotePatch, Totals, normalize_line_endings,
};
use tracing::{debug, info, warn};

use crate::{Effects, FetchRequest, Geometry, Paint};

#[derive(Debug)]
pub enum Backing {
    Memory(MemoryLineStore),
    Remote(RemoteLineStore),
}

impl Backing {
    fn store(&self) -> &dyn LineStore {
        match self {
            Backing::Memory(s) => s,
            Backing::Remote(s) => s,
        }
    }

    fn store_mut(&mut self) -> &mut dyn LineStore {
        match self {
            Backing::Memory(s) => s,
            Backing::Remote(s) => s,
        }
    }

    fn take_patches(&mut self) -> Vec<RemotePatch> {
        match self {
            Backing::Memory(_) => Vec::new(),
            Backing::Remote(s) => s.take_pending_patches(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabPhase {
    Ready,
    Rendering(LineWindow),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    ticket: Ticket,
    window: LineWindow,
}

/// What closing a tab leaves behind.
#[derive(Debug, Default)]
pub struct CloseOutcome {
    /// Work produced by applying the final snapshot and releasing the tab.
    pub effects: Effects,
    /// Canonical text of a memory-backed buffer.
    pub text: Option<String>,
    pub line_ending: LineEnding,
    pub dirty: bool,
    pub remote: bool,
}

#[derive(Debug)]
pub struct BufferController {
    path: PathBuf,
    display_name: String,
    language: Language,
    line_ending: LineEnding,
    backing: Backing,
    settings: RenderSettings,
    scroll_top: f64,
    container_height: f64,
    mode: RenderMode,
    viewport: Viewport,
    scheduler: RenderScheduler,
    reconciler: Reconciler,
    frame: Frame,
    batch: Option<BatchCursor>,
    phase: TabPhase,
    in_flight: Option<InFlight>,
    dirty: bool,
}

impl BufferController {
    /// Build from raw file text; line endings are normalized here.
    pub fn from_text(path: &Path, raw: &str, settings: RenderSettings, geometry: Geometry) -> Self {
        let norm = normalize_line_endings(raw);
        if norm.mixed {
            warn!(
                target: "state.controller",
                path = %path.display(),
                dominant = ?norm.original,
                "mixed_line_endings"
            );
        }
        let store = MemoryLineStore::from_text(&norm.normalized);
        Self::new(path, Backing::Memory(store), norm.original, settings, geometry)
    }

    /// Build from already canonical text (content cache hit).
    pub fn from_canonical(
        path: &Path,
        text: &str,
        line_ending: LineEnding,
        dirty: bool,
        settings: RenderSettings,
        geometry: Geometry,
    ) -> Self {
        let store = MemoryLineStore::from_text(text);
        let mut ctl = Self::new(path, Backing::Memory(store), line_ending, settings, geometry);
        ctl.dirty = dirty;
        ctl
    }

    /// Build over a provider-held document. Its line ending stays with the
    /// provider.
    pub fn from_remote(path: &Path, totals: Totals, settings: RenderSettings, geometry: Geometry) -> Self {
        let store = RemoteLineStore::new(totals);
        Self::new(path, Backing::Remote(store), LineEnding::Lf, settings, geometry)
    }

    fn new(
        path: &Path,
        backing: Backing,
        line_ending: LineEnding,
        settings: RenderSettings,
        geometry: Geometry,
    ) -> Self {
        let total = backing.store().total_lines();
        let mode = settings.mode_for(total);
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(
            target: "state.controller",
            path = %path.display(),
            total_lines = total,
            mode = mode.as_str(),
            remote = matches!(backing, Backing::Remote(_)),
            "tab_created"
        );
        Self {
            path: path.to_path_buf(),
            display_name,
            language: Language::detect(path),
            line_ending,
            backing,
            settings,
            scroll_top: 0.0,
            container_height: geometry.height,
            mode,
            viewport: Viewport::compute(0.0, geometry.height, total, &settings),
            scheduler: RenderScheduler::new(),
            reconciler: Reconciler::new(),
            frame: Frame::empty(settings.line_height),
            batch: None,
            phase: TabPhase::Ready,
            in_flight: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_virtual_scroll(&self) -> bool {
        self.mode == RenderMode::Virtual
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backing, Backing::Remote(_))
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn phase(&self) -> TabPhase {
        self.phase
    }

    pub fn totals(&self) -> Totals {
        self.backing.store().totals()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn in_flight_ticket(&self) -> Option<Ticket> {
        self.in_flight.map(|f| f.ticket)
    }

    pub fn has_pending_batches(&self) -> bool {
        self.batch.is_some()
    }

    pub fn scheduler_metrics(&self) -> SchedulerMetricsSnapshot {
        self.scheduler.metrics_snapshot()
    }

    /// Canonical text for memory-backed buffers.
    pub fn content_text(&self) -> Option<String> {
        match &self.backing {
            Backing::Memory(s) => Some(s.text()),
            Backing::Remote(_) => None,
        }
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// First render after creation.
    pub fn start(&mut self) -> Effects {
        self.scheduler.mark(RenderRequest::Rebuild(RebuildReason::OPEN));
        let effects = self.pump();
        self.finish(effects)
    }

    pub fn on_scroll(&mut self, offset_px: f64) -> Effects {
        if self.phase == TabPhase::Closed {
            return Effects::default();
        }
        self.recompute_viewport(offset_px);
        self.request_viewport_window()
    }

    pub fn on_resize(&mut self, geometry: Geometry) -> Effects {
        if self.phase == TabPhase::Closed {
            return Effects::default();
        }
        self.container_height = geometry.height;
        self.recompute_viewport(self.scroll_top);
        self.request_viewport_window()
    }

    /// Read an edited visual snapshot back into the store.
    pub fn on_edit(&mut self, snapshot: &VisualNode) -> Effects {
        if self.phase == TabPhase::Closed {
            return Effects::default();
        }
        if self.frame.lines.is_empty() {
            // Nothing on screen yet, so the snapshot cannot hold user edits.
            debug!(target: "state.controller", path = %self.path.display(), "edit_before_first_paint");
            return Effects::default();
        }
        let materialized = self.frame.materialized();
        let previous = std::mem::take(&mut self.frame.lines);
        let outcome = self.reconciler.reconcile(
            self.backing.store_mut(),
            materialized,
            &previous,
            snapshot,
        );
        let mut effects = Effects::default();
        match outcome.change {
            Change::Unchanged => {
                self.frame.lines = previous;
                return effects;
            }
            Change::Patched(ranges) => {
                debug!(target: "state.controller", path = %self.path.display(), runs = ranges.len(), "lines_patched");
                self.frame.lines = outcome.lines;
            }
            Change::Structural { before, after } => {
                info!(
                    target: "state.controller",
                    path = %self.path.display(),
                    before = before.total_lines,
                    after = after.total_lines,
                    "structural_edit"
                );
                self.frame.lines = outcome.lines;
                effects.structural = true;
                self.scheduler
                    .mark(RenderRequest::Rebuild(RebuildReason::STRUCTURAL));
            }
        }
        self.dirty = true;
        effects.content_changed = true;
        if !effects.structural {
            // A fetch issued before this edit may read pre-edit content.
            effects.merge(self.reissue_in_flight());
        }
        effects.merge(self.pump());
        self.finish(effects)
    }

    /// Result of a fetch issued by this controller.
    pub fn on_lines_loaded(&mut self, loaded: LinesLoaded) -> Effects {
        let current = match self.in_flight {
            Some(f) if f.ticket == loaded.ticket && self.phase != TabPhase::Closed => f,
            other => {
                debug!(
                    target: "state.controller",
                    path = %self.path.display(),
                    ticket = loaded.ticket.0,
                    expected = other.map(|f| f.ticket.0),
                    "fetch_stale_discarded"
                );
                return Effects::default();
            }
        };
        self.in_flight = None;
        let lines = match loaded.result {
            Ok(lines) => lines,
            Err(error) => {
                warn!(
                    target: "state.controller",
                    path = %self.path.display(),
                    start = loaded.range.start,
                    end = loaded.range.end,
                    %error,
                    "fetch_failed"
                );
                self.phase = TabPhase::Ready;
                return Effects::default();
            }
        };
        let Backing::Remote(store) = &mut self.backing else {
            return Effects::default();
        };
        self.language = lines.language;
        let drifted = !store.has_pending_patches()
            && lines.totals.total_lines != store.total_lines();
        if drifted {
            warn!(
                target: "state.controller",
                path = %self.path.display(),
                local = store.total_lines(),
                provider = lines.totals.total_lines,
                "totals_drift"
            );
            store.set_totals(lines.totals);
        }
        store.absorb(loaded.range.start, lines.lines);

        let effects = if drifted {
            self.scheduler
                .mark(RenderRequest::Rebuild(RebuildReason::RELOAD));
            self.pump()
        } else if self.wanted_window() != current.window {
            debug!(target: "state.controller", path = %self.path.display(), "fetch_window_superseded");
            self.render_window(self.wanted_window())
        } else {
            self.install_resident(current.window)
        };
        self.finish(effects)
    }

    /// Advance batched full-buffer materialization by one batch.
    pub fn frame_tick(&mut self) -> Effects {
        if self.batch.is_none() || self.phase == TabPhase::Closed {
            return Effects::default();
        }
        let effects = self.place_batch();
        self.finish(effects)
    }

    /// Tab became active again. A complete cached frame is restored in one
    /// shot; otherwise windowing is rebuilt from the saved scroll offset.
    pub fn reactivate(&mut self, cached: Option<&[Line]>, geometry: Geometry) -> Effects {
        self.container_height = geometry.height;
        let total = self.backing.store().total_lines();
        let mut effects = Effects::default();
        match cached {
            Some(lines)
                if self.settings.mode_for(total) == RenderMode::Full && lines.len() == total =>
            {
                self.mode = RenderMode::Full;
                self.recompute_viewport(self.scroll_top);
                if let Some(old) = self.in_flight.take() {
                    effects.cancel.push(old.ticket);
                }
                self.batch = None;
                self.frame = Frame::full_restored(lines.to_vec(), self.settings.line_height);
                self.scheduler.note_rendered(self.frame.window);
                self.phase = TabPhase::Ready;
                debug!(target: "state.controller", path = %self.path.display(), "restored_from_render_cache");
                effects.paint = Some(self.paint());
            }
            _ => {
                self.scheduler
                    .mark(RenderRequest::Rebuild(RebuildReason::ACTIVATE));
                effects.merge(self.pump());
            }
        }
        self.finish(effects)
    }

    /// Apply an optional final snapshot, then release all pending work.
    pub fn close(&mut self, snapshot: Option<&VisualNode>) -> CloseOutcome {
        let mut effects = match snapshot {
            Some(s) => self.on_edit(s),
            None => Effects::default(),
        };
        // Nothing is rendered after close.
        effects.paint = None;
        effects.fetch = None;
        if let Some(old) = self.in_flight.take() {
            effects.cancel.push(old.ticket);
        }
        effects.patches.extend(self.backing.take_patches());
        self.batch = None;
        self.scheduler.clear();
        self.phase = TabPhase::Closed;
        info!(target: "state.controller", path = %self.path.display(), dirty = self.dirty, "tab_closed");
        CloseOutcome {
            effects,
            text: self.content_text(),
            line_ending: self.line_ending,
            dirty: self.dirty,
            remote: self.is_remote(),
        }
    }

    fn recompute_viewport(&mut self, offset_px: f64) {
        let total = self.backing.store().total_lines();
        self.viewport = Viewport::compute(offset_px, self.container_height, total, &self.settings);
        self.scroll_top = self.viewport.scroll_top;
    }

    /// Full mode places the whole buffer regardless of scroll position.
    fn wanted_window(&self) -> LineWindow {
        match self.mode {
            RenderMode::Full => LineWindow::new(0, self.backing.store().total_lines()),
            RenderMode::Virtual => self.viewport.window,
        }
    }

    fn request_viewport_window(&mut self) -> Effects {
        if self.mode == RenderMode::Full {
            return Effects::default();
        }
        let window = self.viewport.window;
        self.scheduler.mark(RenderRequest::Window(window));
        let mut effects = self.pump();
        // Back on the window already shown: an older fetch is no longer wanted.
        if let Some(old) = self.in_flight.filter(|f| f.window != window) {
            debug!(target: "state.controller", ticket = old.ticket.0, "fetch_abandoned");
            self.in_flight = None;
            self.phase = TabPhase::Ready;
            effects.cancel.push(old.ticket);
        }
        self.finish(effects)
    }

    fn pump(&mut self) -> Effects {
        let Some(decision) = self.scheduler.consume() else {
            return Effects::default();
        };
        match decision.effective {
            RenderRequest::Rebuild(reasons) => self.rebuild(reasons),
            RenderRequest::Window(window) => self.render_window(window),
        }
    }

    fn rebuild(&mut self, reasons: RebuildReason) -> Effects {
        let mut effects = Effects::default();
        if let Some(old) = self.in_flight.take() {
            effects.cancel.push(old.ticket);
        }
        let total = self.backing.store().total_lines();
        let mode = self.settings.mode_for(total);
        if mode != self.mode {
            info!(
                target: "state.controller",
                path = %self.path.display(),
                from = self.mode.as_str(),
                to = mode.as_str(),
                total_lines = total,
                "render_mode_switch"
            );
        }
        self.mode = mode;
        self.recompute_viewport(self.scroll_top);
        self.scheduler.forget_rendered();
        self.batch = None;
        debug!(
            target: "state.controller",
            path = %self.path.display(),
            ?reasons,
            mode = mode.as_str(),
            total_lines = total,
            "rebuild"
        );
        match (mode, &self.backing) {
            (RenderMode::Full, Backing::Memory(_)) => {
                self.frame = Frame::full(total, self.settings.line_height);
                self.batch = Some(BatchCursor::new(total, self.settings.batch_size));
                self.phase = TabPhase::Rendering(self.frame.window);
                effects.merge(self.place_batch());
            }
            (RenderMode::Full, Backing::Remote(_)) => {
                effects.merge(self.render_window(LineWindow::new(0, total)));
            }
            (RenderMode::Virtual, _) => {
                effects.merge(self.render_window(self.viewport.window));
            }
        }
        effects
    }

    fn render_window(&mut self, window: LineWindow) -> Effects {
        let mut effects = Effects::default();
        self.phase = TabPhase::Rendering(window);
        match self.backing.store().get_range(window.range()) {
            RangeRead::Ready(lines) => {
                if let Some(old) = self.in_flight.take() {
                    effects.cancel.push(old.ticket);
                }
                effects.merge(self.install(window, lines));
            }
            RangeRead::Missing(_) => {
                if self.in_flight.is_some_and(|f| f.window == window) {
                    return effects;
                }
                if let Some(old) = self.in_flight.take() {
                    debug!(target: "state.controller", ticket = old.ticket.0, "fetch_superseded");
                    effects.cancel.push(old.ticket);
                }
                effects.fetch = Some(self.issue_fetch(window));
            }
        }
        effects
    }

    fn issue_fetch(&mut self, window: LineWindow) -> FetchRequest {
        let ticket = Ticket::next();
        self.in_flight = Some(InFlight { ticket, window });
        debug!(
            target: "state.controller",
            path = %self.path.display(),
            ticket = ticket.0,
            start = window.start,
            end = window.end,
            "fetch_issued"
        );
        FetchRequest {
            path: self.path.clone(),
            ticket,
            range: window.range(),
        }
    }

    fn reissue_in_flight(&mut self) -> Effects {
        let mut effects = Effects::default();
        if let Some(old) = self.in_flight.take() {
            effects.cancel.push(old.ticket);
            effects.fetch = Some(self.issue_fetch(old.window));
        }
        effects
    }

    fn install_resident(&mut self, window: LineWindow) -> Effects {
        match self.backing.store().get_range(window.range()) {
            RangeRead::Ready(lines) => self.install(window, lines),
            RangeRead::Missing(missing) => {
                warn!(
                    target: "state.controller",
                    path = %self.path.display(),
                    start = missing.start,
                    end = missing.end,
                    "fetch_short_read"
                );
                self.phase = TabPhase::Ready;
                Effects::default()
            }
        }
    }

    fn install(&mut self, window: LineWindow, lines: Vec<Line>) -> Effects {
        let total = self.backing.store().total_lines();
        let mut effects = Effects::default();
        self.frame = match self.mode {
            RenderMode::Full => {
                effects.completed_full = true;
                Frame::full_restored(lines, self.settings.line_height)
            }
            RenderMode::Virtual => {
                Frame::windowed(window, total, self.settings.line_height, lines)
            }
        };
        self.scheduler.note_rendered(window);
        self.phase = TabPhase::Ready;
        effects.paint = Some(self.paint());
        effects
    }

    fn place_batch(&mut self) -> Effects {
        let mut effects = Effects::default();
        let Some((range, done)) = self
            .batch
            .as_mut()
            .and_then(|c| c.next_batch().map(|r| (r, c.is_done())))
        else {
            self.batch = None;
            return effects;
        };
        match self.backing.store().get_range(range.clone()) {
            RangeRead::Ready(lines) => self.frame.push_batch(lines),
            RangeRead::Missing(_) => {
                warn!(target: "state.controller", start = range.start, end = range.end, "batch_not_resident");
                self.batch = None;
                self.phase = TabPhase::Ready;
                return effects;
            }
        }
        if done {
            self.batch = None;
            self.scheduler.note_rendered(self.frame.window);
            self.phase = TabPhase::Ready;
            effects.completed_full = true;
            debug!(
                target: "state.controller",
                path = %self.path.display(),
                total_lines = self.frame.total_lines,
                "full_render_complete"
            );
        }
        effects.paint = Some(self.paint());
        effects
    }

    fn paint(&self) -> Paint {
        Paint {
            path: self.path.clone(),
            mode: self.frame.mode,
            window: self.frame.window,
            total_lines: self.frame.total_lines,
            placed: self.frame.materialized(),
            leading_spacer_px: self.frame.leading_spacer_px(),
            trailing_spacer_px: self.frame.trailing_spacer_px(),
            complete: self.frame.is_complete(),
        }
    }

    fn finish(&mut self, mut effects: Effects) -> Effects {
        effects.patches.extend(self.backing.take_patches());
        effects
    }
}

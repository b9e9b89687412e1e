//! Explicit owner of every open tab and the caches shared between them.
//!
//! All operations are synchronous and IO-free. Each returns the
//! [`TabUpdate`]s the caller must execute (paint, fetch, cancel, forward
//! patches); [`crate::driver::SessionDriver`] is the async executor.
//!
//! Cache upkeep happens here rather than in the controllers:
//! * any content change invalidates the path's render cache entry and, for
//!   memory-backed tabs, rewrites its content cache entry as dirty;
//! * a full-mode frame that is complete after an update is (re)cached.

use std::path::{Path, PathBuf};

use ahash::AHashSet;
use core_events::{LinesLoaded, OpenedContent, VisualNode};
use core_io::IoError;
use core_render::{PutOutcome, RenderCache, RenderMode, RenderSettings};
use core_state::{BufferController, ContentCache, Effects, Geometry};
use core_text::Line;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tabs::TabManager;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open {}: {reason}", path.display())]
    OpenFailed { path: PathBuf, reason: String },
    #[error("no active tab")]
    NoActiveTab,
    #[error("tab not open: {}", path.display())]
    TabNotOpen { path: PathBuf },
    #[error("collaborator call failed for {}", path.display())]
    Provider {
        path: PathBuf,
        #[source]
        source: IoError,
    },
}

/// Knobs fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub render: RenderSettings,
    pub render_cache_limit_mb: f64,
    pub geometry: Geometry,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            render_cache_limit_mb: RenderCache::DEFAULT_LIMIT_MB,
            geometry: Geometry::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &core_config::Config, geometry: Geometry) -> Self {
        let f = &config.file;
        Self {
            render: RenderSettings {
                line_height: f.viewport.line_height,
                buffer_margin: f.viewport.buffer_margin,
                full_render_threshold: f.render.full_render_threshold,
                batch_size: f.render.batch_size,
            },
            render_cache_limit_mb: f.cache.render_cache_limit_mb,
            geometry,
        }
    }
}

/// Effects produced by one tab.
#[derive(Debug, Clone, PartialEq)]
pub struct TabUpdate {
    pub path: PathBuf,
    pub effects: Effects,
}

impl TabUpdate {
    fn none(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            effects: Effects::default(),
        }
    }
}

/// First step of opening a path.
#[derive(Debug, PartialEq)]
pub enum OpenStart {
    /// Already open; it was activated.
    Activated(TabUpdate),
    /// Rebuilt from the content cache without touching disk.
    Restored(TabUpdate),
    /// A closed tab whose unsaved edits still live in the provider; its
    /// totals must be re-read before [`EditorSession::finish_open`].
    Reattach,
    /// Content must be loaded before [`EditorSession::finish_open`].
    Load,
    /// An earlier open of the same path has not finished.
    Pending,
}

/// Result of closing one tab.
#[derive(Debug)]
pub struct Closed {
    pub update: TabUpdate,
    pub dirty: bool,
    /// The provider document can be released.
    pub release_virtual: bool,
    /// Tab that became active in its place.
    pub activated: Option<TabUpdate>,
}

/// What a save-all must write.
#[derive(Debug, Default, PartialEq)]
pub struct SavePlan {
    /// Dirty memory-backed buffers as on-disk text.
    pub files: Vec<(PathBuf, String)>,
    /// Dirty provider documents, open or detached.
    pub virtual_docs: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct EditorSession {
    options: SessionOptions,
    tabs: TabManager,
    render_cache: RenderCache,
    content_cache: ContentCache,
    opening: AHashSet<PathBuf>,
    /// Closed remote tabs with edits not yet saved by the provider.
    detached_virtual: AHashSet<PathBuf>,
}

impl EditorSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            render_cache: RenderCache::new(options.render_cache_limit_mb),
            options,
            tabs: TabManager::new(),
            content_cache: ContentCache::new(),
            opening: AHashSet::new(),
            detached_virtual: AHashSet::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.options.render
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    pub fn render_cache(&self) -> &RenderCache {
        &self.render_cache
    }

    pub fn content_cache(&self) -> &ContentCache {
        &self.content_cache
    }

    pub fn is_opening(&self, path: &Path) -> bool {
        self.opening.contains(path)
    }

    pub fn has_pending_opens(&self) -> bool {
        !self.opening.is_empty()
    }

    pub fn begin_open(&mut self, path: &Path) -> OpenStart {
        if self.tabs.contains(path) {
            return OpenStart::Activated(self.switch_to(path));
        }
        if self.opening.contains(path) {
            debug!(target: "model.session", path = %path.display(), "open_already_pending");
            return OpenStart::Pending;
        }
        if self.detached_virtual.contains(path) {
            self.opening.insert(path.to_path_buf());
            return OpenStart::Reattach;
        }
        if let Some(entry) = self.content_cache.get(path) {
            let tab = BufferController::from_canonical(
                path,
                &entry.text,
                entry.line_ending,
                entry.dirty,
                self.options.render,
                self.options.geometry,
            );
            info!(target: "model.session", path = %path.display(), dirty = entry.dirty, "tab_restored");
            self.tabs.insert(tab);
            return OpenStart::Restored(self.switch_to(path));
        }
        self.opening.insert(path.to_path_buf());
        OpenStart::Load
    }

    /// Complete an open started with [`OpenStart::Load`] or
    /// [`OpenStart::Reattach`]. On failure no tab is created.
    pub fn finish_open(
        &mut self,
        path: &Path,
        result: Result<OpenedContent, String>,
    ) -> Result<TabUpdate, SessionError> {
        if !self.opening.remove(path) {
            debug!(target: "model.session", path = %path.display(), "open_result_unrequested");
        }
        if self.tabs.contains(path) {
            return Ok(self.switch_to(path));
        }
        let content = result.map_err(|reason| {
            warn!(target: "model.session", path = %path.display(), %reason, "open_failed");
            SessionError::OpenFailed {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        let settings = self.options.render;
        let geometry = self.options.geometry;
        let tab = match content {
            OpenedContent::Text(raw) => {
                let tab = BufferController::from_text(path, &raw, settings, geometry);
                if let Some(text) = tab.content_text() {
                    self.content_cache.put_clean(path, text, tab.line_ending());
                }
                // Disk content may differ from an older cached frame.
                self.render_cache.invalidate(path);
                tab
            }
            OpenedContent::Virtual(totals) => {
                self.detached_virtual.remove(path);
                BufferController::from_remote(path, totals, settings, geometry)
            }
        };
        info!(
            target: "model.session",
            path = %path.display(),
            total_lines = tab.totals().total_lines,
            remote = tab.is_remote(),
            "tab_opened"
        );
        self.tabs.insert(tab);
        let effects = match self.tabs.get_mut(path) {
            Some(tab) => tab.start(),
            None => Effects::default(),
        };
        Ok(self.settle(path, effects))
    }

    pub fn activate(&mut self, path: &Path) -> Result<TabUpdate, SessionError> {
        if !self.tabs.contains(path) {
            return Err(SessionError::TabNotOpen {
                path: path.to_path_buf(),
            });
        }
        if self.tabs.is_active(path) {
            return Ok(TabUpdate::none(path));
        }
        Ok(self.switch_to(path))
    }

    pub fn on_scroll(&mut self, offset_px: f64) -> Result<TabUpdate, SessionError> {
        let tab = self.tabs.active_mut().ok_or(SessionError::NoActiveTab)?;
        let path = tab.path().to_path_buf();
        let effects = tab.on_scroll(offset_px);
        Ok(self.settle(&path, effects))
    }

    /// New container geometry. Inactive tabs pick it up when activated.
    pub fn on_resize(&mut self, geometry: Geometry) -> Option<TabUpdate> {
        self.options.geometry = geometry;
        let tab = self.tabs.active_mut()?;
        let path = tab.path().to_path_buf();
        let effects = tab.on_resize(geometry);
        Some(self.settle(&path, effects))
    }

    pub fn on_edit(&mut self, snapshot: &VisualNode) -> Result<TabUpdate, SessionError> {
        let tab = self.tabs.active_mut().ok_or(SessionError::NoActiveTab)?;
        let path = tab.path().to_path_buf();
        let effects = tab.on_edit(snapshot);
        Ok(self.settle(&path, effects))
    }

    /// Route a fetch result to its tab. Results for closed tabs are dropped.
    pub fn on_lines_loaded(&mut self, loaded: LinesLoaded) -> Option<TabUpdate> {
        let path = loaded.path.clone();
        let Some(tab) = self.tabs.get_mut(&path) else {
            debug!(target: "model.session", path = %path.display(), ticket = loaded.ticket.0, "fetch_for_closed_tab");
            return None;
        };
        let effects = tab.on_lines_loaded(loaded);
        Some(self.settle(&path, effects))
    }

    /// Advance batched rendering of the active tab only.
    pub fn frame_tick(&mut self) -> Option<TabUpdate> {
        let tab = self.tabs.active_mut()?;
        if !tab.has_pending_batches() {
            return None;
        }
        let path = tab.path().to_path_buf();
        let effects = tab.frame_tick();
        Some(self.settle(&path, effects))
    }

    /// Close a tab, flushing its content. `snapshot` is the tab's final
    /// visual state when it is the active one.
    pub fn close(&mut self, path: &Path, snapshot: Option<&VisualNode>) -> Result<Closed, SessionError> {
        let was_active = self.tabs.is_active(path);
        let tab = self.tabs.remove(path).ok_or_else(|| SessionError::TabNotOpen {
            path: path.to_path_buf(),
        })?;
        let mut closed = self.retire(tab, snapshot);
        if was_active && let Some(next) = self.tabs.active().map(|t| t.path().to_path_buf()) {
            closed.activated = Some(self.switch_to(&next));
        }
        Ok(closed)
    }

    /// Dirty memory-backed content as on-disk text, sorted by path.
    pub fn saveable_content(&self) -> Vec<(PathBuf, String)> {
        self.content_cache.saveable()
    }

    pub fn save_plan(&self) -> SavePlan {
        let mut virtual_docs: Vec<PathBuf> = self
            .tabs
            .iter()
            .filter(|t| t.is_remote() && t.is_dirty())
            .map(|t| t.path().to_path_buf())
            .chain(self.detached_virtual.iter().cloned())
            .collect();
        virtual_docs.sort();
        virtual_docs.dedup();
        SavePlan {
            files: self.saveable_content(),
            virtual_docs,
        }
    }

    /// Record a successful write. Returns true when the path was a detached
    /// provider document that can now be released.
    pub fn mark_saved(&mut self, path: &Path) -> bool {
        self.content_cache.mark_saved(path);
        if let Some(tab) = self.tabs.get_mut(path) {
            tab.mark_saved();
            return false;
        }
        self.detached_virtual.remove(path)
    }

    /// Close every tab without a final snapshot.
    pub fn shutdown(&mut self) -> Vec<Closed> {
        let tabs = self.tabs.drain();
        info!(target: "model.session", tabs = tabs.len(), "session_shutdown");
        let closed: Vec<Closed> = tabs.into_iter().map(|t| self.retire(t, None)).collect();
        if !self.detached_virtual.is_empty() {
            warn!(
                target: "model.session",
                unsaved = self.detached_virtual.len(),
                "unsaved_virtual_documents"
            );
        }
        closed
    }

    fn retire(&mut self, mut tab: BufferController, snapshot: Option<&VisualNode>) -> Closed {
        let path = tab.path().to_path_buf();
        let outcome = tab.close(snapshot);
        if outcome.effects.content_changed {
            self.render_cache.invalidate(&path);
        }
        match outcome.text {
            Some(text) if outcome.dirty => self.content_cache.put_edited(&path, text, outcome.line_ending),
            Some(text) => self.content_cache.put_clean(&path, text, outcome.line_ending),
            None => {}
        }
        let release_virtual = outcome.remote && !outcome.dirty;
        if outcome.remote && outcome.dirty {
            self.detached_virtual.insert(path.clone());
        }
        Closed {
            update: TabUpdate {
                path,
                effects: outcome.effects,
            },
            dirty: outcome.dirty,
            release_virtual,
            activated: None,
        }
    }

    fn switch_to(&mut self, path: &Path) -> TabUpdate {
        self.tabs.activate(path);
        let geometry = self.options.geometry;
        let cached = self.render_cache.get(path);
        let effects = match self.tabs.get_mut(path) {
            Some(tab) => tab.reactivate(cached, geometry),
            None => Effects::default(),
        };
        debug!(target: "model.session", path = %path.display(), "tab_activated");
        self.settle(path, effects)
    }

    fn settle(&mut self, path: &Path, effects: Effects) -> TabUpdate {
        let Some(tab) = self.tabs.get(path) else {
            return TabUpdate {
                path: path.to_path_buf(),
                effects,
            };
        };
        if effects.content_changed {
            self.render_cache.invalidate(path);
            if let Some(text) = tab.content_text() {
                self.content_cache.put_edited(path, text, tab.line_ending());
            }
        }
        let frame = tab.frame();
        let cacheable = frame.mode == RenderMode::Full
            && frame.is_complete()
            && !tab.has_pending_batches()
            && (effects.completed_full || effects.content_changed);
        if cacheable {
            let lines = frame.lines.clone();
            self.cache_frame(path, lines);
        }
        TabUpdate {
            path: path.to_path_buf(),
            effects,
        }
    }

    fn cache_frame(&mut self, path: &Path, lines: Vec<Line>) {
        match self.render_cache.put(path, lines) {
            PutOutcome::Stored { evicted } if !evicted.is_empty() => {
                debug!(target: "model.session", path = %path.display(), evicted = evicted.len(), "render_cache_made_room");
            }
            PutOutcome::Stored { .. } => {}
            PutOutcome::TooLarge => {
                debug!(target: "model.session", path = %path.display(), "render_cache_skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_render::LineWindow;
    use core_text::Totals;
    use pretty_assertions::assert_eq;

    fn doc(lines: &[&str]) -> VisualNode {
        VisualNode::group(lines.iter().map(|l| VisualNode::line(*l)).collect())
    }

    fn open_text(s: &mut EditorSession, path: &str, text: &str) -> TabUpdate {
        let path = Path::new(path);
        assert_eq!(s.begin_open(path), OpenStart::Load);
        s.finish_open(path, Ok(OpenedContent::Text(text.into()))).unwrap()
    }

    #[test]
    fn small_file_opens_full_and_is_cached() {
        let mut s = EditorSession::new(SessionOptions::default());
        let update = open_text(&mut s, "/w/a.txt", "a\nb\nc");
        let paint = update.effects.paint.unwrap();
        assert_eq!(paint.mode, RenderMode::Full);
        assert_eq!(paint.window, LineWindow::new(0, 3));
        assert!(s.render_cache().contains(Path::new("/w/a.txt")));
        assert!(!s.is_opening(Path::new("/w/a.txt")));
    }

    #[test]
    fn open_failure_creates_no_tab() {
        let mut s = EditorSession::new(SessionOptions::default());
        let path = Path::new("/w/missing.txt");
        s.begin_open(path);
        let err = s.finish_open(path, Err("not found".into())).unwrap_err();
        assert!(matches!(err, SessionError::OpenFailed { .. }));
        assert!(s.tabs().is_empty());
        assert!(matches!(s.on_scroll(10.0), Err(SessionError::NoActiveTab)));
    }

    #[test]
    fn duplicate_open_is_pending_then_reused() {
        let mut s = EditorSession::new(SessionOptions::default());
        let path = Path::new("/w/a.txt");
        assert_eq!(s.begin_open(path), OpenStart::Load);
        assert_eq!(s.begin_open(path), OpenStart::Pending);
        s.finish_open(path, Ok(OpenedContent::Text("x".into()))).unwrap();
        assert!(matches!(s.begin_open(path), OpenStart::Activated(_)));
        assert_eq!(s.tabs().len(), 1);
    }

    #[test]
    fn edit_invalidates_then_recaches_render_entry() {
        let mut s = EditorSession::new(SessionOptions::default());
        open_text(&mut s, "/w/a.txt", "a\nb\nc");
        s.on_edit(&doc(&["a", "B", "c"])).unwrap();
        let path = Path::new("/w/a.txt");
        assert_eq!(
            s.render_cache().get(path).map(<[Line]>::to_vec),
            Some(vec!["a".to_string(), "B".into(), "c".into()])
        );
        assert_eq!(s.saveable_content(), vec![(path.to_path_buf(), "a\nB\nc".to_string())]);
    }

    #[test]
    fn closing_dirty_tab_keeps_last_extracted_content() {
        let mut s = EditorSession::new(SessionOptions::default());
        open_text(&mut s, "/w/a.txt", "a\nb\nc");
        s.on_edit(&doc(&["a", "b", "c", "d"])).unwrap();
        let closed = s
            .close(Path::new("/w/a.txt"), Some(&doc(&["a", "final"])))
            .unwrap();
        assert!(closed.dirty);
        let entry = s.content_cache().get(Path::new("/w/a.txt")).unwrap();
        assert_eq!(entry.text, "a\nfinal");
        assert!(entry.dirty);
    }

    #[test]
    fn reopen_after_close_restores_from_content_cache() {
        let mut s = EditorSession::new(SessionOptions::default());
        open_text(&mut s, "/w/a.txt", "one\r\ntwo");
        s.on_edit(&doc(&["one", "2"])).unwrap();
        s.close(Path::new("/w/a.txt"), None).unwrap();
        match s.begin_open(Path::new("/w/a.txt")) {
            OpenStart::Restored(update) => assert!(update.effects.paint.unwrap().complete),
            other => panic!("expected restore, got {other:?}"),
        }
        let tab = s.tabs().active().unwrap();
        assert!(tab.is_dirty());
        assert_eq!(tab.content_text().as_deref(), Some("one\n2"));
        assert_eq!(
            s.saveable_content(),
            vec![(PathBuf::from("/w/a.txt"), "one\r\n2".to_string())]
        );
    }

    #[test]
    fn closing_active_tab_activates_neighbour() {
        let mut s = EditorSession::new(SessionOptions::default());
        open_text(&mut s, "/w/a.txt", "a");
        open_text(&mut s, "/w/b.txt", "b");
        let closed = s.close(Path::new("/w/b.txt"), None).unwrap();
        let next = closed.activated.unwrap();
        assert_eq!(next.path, PathBuf::from("/w/a.txt"));
        assert!(s.tabs().is_active(Path::new("/w/a.txt")));
    }

    #[test]
    fn dirty_virtual_tab_is_detached_until_saved() {
        let mut s = EditorSession::new(SessionOptions::default());
        let path = Path::new("/w/huge.log");
        s.begin_open(path);
        let update = s
            .finish_open(path, Ok(OpenedContent::Virtual(Totals::new(100_000, 1_000_000))))
            .unwrap();
        let fetch = update.effects.fetch.unwrap();
        let lines: Vec<String> = fetch.range.clone().map(|i| i.to_string()).collect();
        s.on_lines_loaded(LinesLoaded {
            path: path.to_path_buf(),
            ticket: fetch.ticket,
            range: fetch.range.clone(),
            result: Ok(core_events::LoadedLines {
                lines,
                totals: Totals::new(100_000, 1_000_000),
                language: core_text::Language::Plaintext,
            }),
        });
        let mut edited = s.tabs().active().unwrap().frame().clone();
        edited.lines[0] = "zero".into();
        let update = s.on_edit(&edited.to_nodes()).unwrap();
        assert_eq!(update.effects.patches.len(), 1);

        let closed = s.close(path, None).unwrap();
        assert!(!closed.release_virtual);
        assert_eq!(s.save_plan().virtual_docs, vec![path.to_path_buf()]);
        assert_eq!(s.begin_open(path), OpenStart::Reattach);
        s.finish_open(path, Err("gone".into())).unwrap_err();
        assert!(s.mark_saved(path));
        assert!(s.save_plan().virtual_docs.is_empty());
    }
}

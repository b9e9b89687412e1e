//! Async executor for session updates.
//!
//! The driver owns the [`EditorSession`] and is the only place that touches
//! the file system and the line provider. Opens and range fetches run as
//! spawned tokio tasks that report back over the session's event channel;
//! every fetch task is registered under its ticket so a superseded fetch can
//! be aborted. Remote patches are forwarded inline, before any new fetch is
//! spawned, so a fetch never reads content older than the edits preceding it.
//!
//! Patches the provider rejects stay queued per document and are retried
//! before anything else touches that document. While a document has such a
//! backlog its fetches are answered with an error instead of stale lines,
//! and saving it fails.
//!
//! UI events that arrive while an open is pending wait until it settles, so
//! they apply to the tab being opened. A shutdown request likewise waits for
//! pending opens, fetches and full-buffer batches, up to [`SHUTDOWN_GRACE`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering::Relaxed;
use std::time::Duration;

use ahash::AHashMap;
use core_events::{
    CHANNEL_SEND_FAILURES, Event, LinesLoaded, LoadedLines, OpenLoaded, OpenedContent, Ticket,
    UiEvent, VisualNode,
};
use core_io::{FileSystem, IoResult, LineProvider};
use core_state::{FetchRequest, Geometry, Paint};
use core_text::{RemotePatch, count_lines};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::session::{EditorSession, OpenStart, SessionError, TabUpdate};

/// Longest a shutdown request waits for outstanding work.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Wire summary of one paint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintNotice {
    pub path: PathBuf,
    pub mode: &'static str,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub placed_lines: usize,
    pub leading_spacer_px: f64,
    pub trailing_spacer_px: f64,
    pub complete: bool,
}

impl From<&Paint> for PaintNotice {
    fn from(p: &Paint) -> Self {
        Self {
            path: p.path.clone(),
            mode: p.mode.as_str(),
            start_line: p.window.start,
            end_line: p.window.end,
            total_lines: p.total_lines,
            placed_lines: p.placed.len(),
            leading_spacer_px: p.leading_spacer_px,
            trailing_spacer_px: p.trailing_spacer_px,
            complete: p.complete,
        }
    }
}

/// Observable outcome reported to the host, one JSON object per notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notice {
    Paint(PaintNotice),
    OpenFailed { path: PathBuf, reason: String },
    Closed { path: PathBuf, dirty: bool },
    Saved { path: PathBuf },
    SaveFailed { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Break,
}

pub struct SessionDriver<F, P> {
    session: EditorSession,
    fs: Arc<F>,
    provider: Arc<P>,
    tx: mpsc::Sender<Event>,
    fetches: AHashMap<Ticket, AbortHandle>,
    /// Patches the provider has not accepted yet, oldest first.
    unsynced: AHashMap<PathBuf, Vec<RemotePatch>>,
    deferred: VecDeque<UiEvent>,
    shutdown_requested: bool,
    notices: Vec<Notice>,
}

impl<F, P> SessionDriver<F, P>
where
    F: FileSystem,
    P: LineProvider,
{
    pub fn new(session: EditorSession, fs: Arc<F>, provider: Arc<P>, tx: mpsc::Sender<Event>) -> Self {
        Self {
            session,
            fs,
            provider,
            tx,
            fetches: AHashMap::new(),
            unsynced: AHashMap::new(),
            deferred: VecDeque::new(),
            shutdown_requested: false,
            notices: Vec::new(),
        }
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    /// Fetch tasks spawned and neither delivered nor cancelled yet.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches.len()
    }

    /// Whether `path` has edits the provider has not accepted.
    pub fn has_unsynced_edits(&self, path: &Path) -> bool {
        self.unsynced.contains_key(path)
    }

    /// No open, fetch, deferred event or full-buffer batch is outstanding.
    pub fn is_settled(&self) -> bool {
        !self.session.has_pending_opens()
            && self.deferred.is_empty()
            && self.fetches.is_empty()
            && !self
                .session
                .tabs()
                .active()
                .is_some_and(|tab| tab.has_pending_batches())
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Process events until shutdown, handing notices to `sink` after each.
    pub async fn run<N>(&mut self, rx: &mut mpsc::Receiver<Event>, mut sink: N)
    where
        N: FnMut(Notice),
    {
        info!(target: "model.driver", "session_loop_start");
        while let Some(event) = rx.recv().await {
            let control = self.handle(event).await;
            for notice in self.take_notices() {
                sink(notice);
            }
            if control == LoopControl::Break {
                break;
            }
        }
    }

    pub async fn handle(&mut self, event: Event) -> LoopControl {
        match event {
            Event::Ui(ui) => {
                if self.session.has_pending_opens() || !self.deferred.is_empty() {
                    trace!(target: "model.driver", op = ui.op_name(), "ui_event_deferred");
                    self.deferred.push_back(ui);
                } else {
                    self.dispatch_ui(ui).await;
                }
            }
            Event::LinesLoaded(loaded) => {
                self.fetches.remove(&loaded.ticket);
                if let Some(update) = self.session.on_lines_loaded(loaded) {
                    self.execute(update).await;
                }
            }
            Event::Opened(opened) => self.on_opened(opened).await,
            Event::FrameTick => {
                if let Some(update) = self.session.frame_tick() {
                    self.execute(update).await;
                }
            }
            Event::Shutdown => {
                if !self.shutdown_requested && !self.is_settled() {
                    self.defer_shutdown();
                    return LoopControl::Continue;
                }
                self.shutdown().await;
                return LoopControl::Break;
            }
        }
        self.replay_deferred().await;
        if self.shutdown_requested && self.is_settled() {
            self.shutdown().await;
            return LoopControl::Break;
        }
        LoopControl::Continue
    }

    async fn dispatch_ui(&mut self, ui: UiEvent) {
        let op = ui.op_name();
        if let Err(error) = self.handle_ui(ui).await {
            warn!(target: "model.driver", op, %error, "ui_event_failed");
        }
    }

    /// Apply deferred UI events in arrival order until one starts an open.
    async fn replay_deferred(&mut self) {
        while !self.session.has_pending_opens() {
            let Some(ui) = self.deferred.pop_front() else {
                break;
            };
            self.dispatch_ui(ui).await;
        }
    }

    /// Wait for outstanding work; a second request, or the grace timer,
    /// forces the shutdown.
    fn defer_shutdown(&mut self) {
        info!(
            target: "model.driver",
            pending_opens = self.session.has_pending_opens(),
            deferred = self.deferred.len(),
            fetches = self.fetches.len(),
            "shutdown_deferred"
        );
        self.shutdown_requested = true;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            if tx.send(Event::Shutdown).await.is_err() {
                CHANNEL_SEND_FAILURES.fetch_add(1, Relaxed);
            }
        });
    }

    async fn handle_ui(&mut self, ui: UiEvent) -> Result<(), SessionError> {
        match ui {
            UiEvent::OpenTab { path } => self.open_tab(path).await,
            UiEvent::CloseTab { path, snapshot } => self.close_tab(&path, snapshot.as_ref()).await,
            UiEvent::ActivateTab { path } => {
                let update = self.session.activate(&path)?;
                self.execute(update).await;
                Ok(())
            }
            UiEvent::Scroll { offset_px } => {
                let update = self.session.on_scroll(offset_px)?;
                self.execute(update).await;
                Ok(())
            }
            UiEvent::Resize { width, height } => {
                if let Some(update) = self.session.on_resize(Geometry::new(width, height)) {
                    self.execute(update).await;
                }
                Ok(())
            }
            UiEvent::Edit { snapshot } => {
                let update = self.session.on_edit(&snapshot)?;
                self.execute(update).await;
                Ok(())
            }
            UiEvent::SaveAll { snapshot } => {
                self.save_all(snapshot.as_ref()).await;
                Ok(())
            }
        }
    }

    pub async fn open_tab(&mut self, path: PathBuf) -> Result<(), SessionError> {
        match self.session.begin_open(&path) {
            OpenStart::Activated(update) | OpenStart::Restored(update) => self.execute(update).await,
            OpenStart::Pending => {}
            OpenStart::Load => self.spawn_open(path, false),
            OpenStart::Reattach => match self.forward_patches(&path, Vec::new()).await {
                Ok(()) => self.spawn_open(path, true),
                Err(error) => {
                    self.on_opened(OpenLoaded {
                        path,
                        result: Err(error.to_string()),
                    })
                    .await
                }
            },
        }
        Ok(())
    }

    pub async fn close_tab(&mut self, path: &Path, snapshot: Option<&VisualNode>) -> Result<(), SessionError> {
        let closed = self.session.close(path, snapshot)?;
        self.execute(closed.update).await;
        if closed.release_virtual {
            self.release_virtual(path).await;
        }
        self.notices.push(Notice::Closed {
            path: path.to_path_buf(),
            dirty: closed.dirty,
        });
        if let Some(update) = closed.activated {
            self.execute(update).await;
        }
        Ok(())
    }

    /// Write every dirty buffer. A final snapshot of the active tab is
    /// applied first. Failures are reported per path and do not stop the
    /// remaining writes.
    pub async fn save_all(&mut self, snapshot: Option<&VisualNode>) -> Vec<SessionError> {
        let mut failures = Vec::new();
        if let Some(snapshot) = snapshot {
            match self.session.on_edit(snapshot) {
                Ok(update) => self.execute(update).await,
                Err(error) => debug!(target: "model.driver", %error, "save_snapshot_ignored"),
            }
        }
        let plan = self.session.save_plan();
        info!(
            target: "model.driver",
            files = plan.files.len(),
            virtual_docs = plan.virtual_docs.len(),
            "save_all"
        );
        for (path, text) in plan.files {
            let result = self.fs.write_file(&path, text).await;
            self.record_save(path, result, false, &mut failures).await;
        }
        for path in plan.virtual_docs {
            // Never write the provider copy while it lags local edits.
            let result = match self.forward_patches(&path, Vec::new()).await {
                Ok(()) => self.provider.save_virtual(&path).await,
                Err(error) => Err(error),
            };
            self.record_save(path, result, true, &mut failures).await;
        }
        failures
    }

    async fn record_save(
        &mut self,
        path: PathBuf,
        result: IoResult<()>,
        is_virtual: bool,
        failures: &mut Vec<SessionError>,
    ) {
        match result {
            Ok(()) => {
                info!(target: "model.driver", path = %path.display(), is_virtual, "saved");
                if self.session.mark_saved(&path) {
                    self.release_virtual(&path).await;
                }
                self.notices.push(Notice::Saved { path });
            }
            Err(source) => {
                warn!(target: "model.driver", path = %path.display(), error = %source, "save_failed");
                self.notices.push(Notice::SaveFailed {
                    path: path.clone(),
                    reason: source.to_string(),
                });
                failures.push(SessionError::Provider { path, source });
            }
        }
    }

    /// Flush every tab and abort outstanding fetches.
    pub async fn shutdown(&mut self) {
        info!(
            target: "model.driver",
            fetches = self.fetches.len(),
            deferred = self.deferred.len(),
            "shutdown_begin"
        );
        for path in self.unsynced.keys() {
            warn!(target: "model.driver", path = %path.display(), "shutdown_with_unsynced_edits");
        }
        for closed in self.session.shutdown() {
            let path = closed.update.path.clone();
            self.execute(closed.update).await;
            if closed.release_virtual {
                self.release_virtual(&path).await;
            }
        }
        for (ticket, handle) in self.fetches.drain() {
            trace!(target: "model.driver", ticket = ticket.0, "fetch_aborted_on_shutdown");
            handle.abort();
        }
        info!(target: "model.driver", "shutdown_complete");
    }

    async fn on_opened(&mut self, opened: OpenLoaded) {
        let OpenLoaded { path, result } = opened;
        match self.session.finish_open(&path, result) {
            Ok(update) => self.execute(update).await,
            Err(error) => self.notices.push(Notice::OpenFailed {
                path,
                reason: error.to_string(),
            }),
        }
    }

    async fn execute(&mut self, update: TabUpdate) {
        let TabUpdate { path, effects } = update;
        for ticket in &effects.cancel {
            if let Some(handle) = self.fetches.remove(ticket) {
                debug!(target: "model.driver", ticket = ticket.0, "fetch_cancelled");
                handle.abort();
            }
        }
        let synced = self.forward_patches(&path, effects.patches).await.is_ok();
        if let Some(fetch) = effects.fetch {
            if synced {
                self.spawn_fetch(fetch);
            } else {
                self.refuse_fetch(fetch);
            }
        }
        if let Some(paint) = &effects.paint {
            self.notices.push(Notice::Paint(paint.into()));
        }
    }

    /// Send queued and new patches for `path` in order. On the first
    /// rejection that patch and everything after it stay queued.
    async fn forward_patches(&mut self, path: &Path, patches: Vec<RemotePatch>) -> IoResult<()> {
        let mut queue = self.unsynced.remove(path).unwrap_or_default();
        if queue.is_empty() && patches.is_empty() {
            return Ok(());
        }
        queue.extend(patches);
        let mut pending = queue.into_iter();
        while let Some(patch) = pending.next() {
            let (start, end) = (patch.range.start, patch.range.end);
            match self
                .provider
                .replace_lines(path, patch.range.clone(), patch.lines.clone())
                .await
            {
                Ok(totals) => trace!(
                    target: "model.driver",
                    path = %path.display(),
                    start,
                    end,
                    total_lines = totals.total_lines,
                    "patch_forwarded"
                ),
                Err(error) => {
                    let mut backlog = vec![patch];
                    backlog.extend(pending);
                    warn!(
                        target: "model.driver",
                        path = %path.display(),
                        start,
                        end,
                        queued = backlog.len(),
                        %error,
                        "patch_forward_failed"
                    );
                    self.unsynced.insert(path.to_path_buf(), backlog);
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Answer a fetch with an error: the provider copy lags local edits.
    fn refuse_fetch(&mut self, request: FetchRequest) {
        let FetchRequest { path, ticket, range } = request;
        debug!(target: "model.driver", path = %path.display(), ticket = ticket.0, "fetch_refused_unsynced");
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let event = Event::LinesLoaded(LinesLoaded {
                path,
                ticket,
                range,
                result: Err("edits not yet accepted by the line provider".to_string()),
            });
            if tx.send(event).await.is_err() {
                CHANNEL_SEND_FAILURES.fetch_add(1, Relaxed);
            }
        });
        self.fetches.insert(ticket, handle.abort_handle());
    }

    fn spawn_fetch(&mut self, request: FetchRequest) {
        let FetchRequest { path, ticket, range } = request;
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let result = provider
                .get_line_range(&path, range.clone())
                .await
                .map(|r| LoadedLines {
                    lines: r.lines,
                    totals: r.totals,
                    language: r.language,
                })
                .map_err(|e| e.to_string());
            let event = Event::LinesLoaded(LinesLoaded {
                path,
                ticket,
                range,
                result,
            });
            if tx.send(event).await.is_err() {
                CHANNEL_SEND_FAILURES.fetch_add(1, Relaxed);
                trace!(target: "model.driver", ticket = ticket.0, "fetch_result_undelivered");
            }
        });
        self.fetches.insert(ticket, handle.abort_handle());
    }

    fn spawn_open(&self, path: PathBuf, reattach: bool) {
        let fs = Arc::clone(&self.fs);
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        let threshold = self.session.settings().full_render_threshold;
        debug!(target: "model.driver", path = %path.display(), reattach, "open_spawned");
        tokio::spawn(async move {
            let result = if reattach {
                provider
                    .get_line_range(&path, 0..0)
                    .await
                    .map(|r| OpenedContent::Virtual(r.totals))
            } else {
                load_for_open(&*fs, &*provider, &path, threshold).await
            };
            let event = Event::Opened(OpenLoaded {
                path,
                result: result.map_err(|e| e.to_string()),
            });
            if tx.send(event).await.is_err() {
                CHANNEL_SEND_FAILURES.fetch_add(1, Relaxed);
            }
        });
    }

    async fn release_virtual(&self, path: &Path) {
        if let Err(error) = self.provider.close_virtual(path).await {
            warn!(target: "model.driver", path = %path.display(), %error, "close_virtual_failed");
        }
    }
}

/// Read `path` once. Files at or below `threshold` lines stay in memory;
/// larger ones are handed to the provider along with the text just read.
async fn load_for_open<F, P>(fs: &F, provider: &P, path: &Path, threshold: usize) -> IoResult<OpenedContent>
where
    F: FileSystem,
    P: LineProvider,
{
    let raw = fs.read_file(path).await?;
    let lines = count_lines(&raw);
    if lines <= threshold {
        return Ok(OpenedContent::Text(raw));
    }
    debug!(target: "model.driver", path = %path.display(), lines, "open_as_virtual");
    provider.adopt_virtual(path, raw).await.map(OpenedContent::Virtual)
}

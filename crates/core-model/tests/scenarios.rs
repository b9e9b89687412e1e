use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use core_events::{EVENT_CHANNEL_CAP, Event, UiEvent, VisualNode};
use core_io::{IoError, IoResult, LineProvider, LineRange, LocalFs, RopeLineProvider};
use core_model::{EditorSession, Notice, PaintNotice, SessionDriver, SessionOptions};
use core_text::{Line, Totals};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

const LIMIT: u64 = 1 << 30;

struct Harness<P = RopeLineProvider> {
    driver: SessionDriver<LocalFs, P>,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_provider(RopeLineProvider::new(LIMIT))
    }
}

impl<P: LineProvider> Harness<P> {
    fn with_provider(provider: P) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAP);
        let driver = SessionDriver::new(
            EditorSession::new(SessionOptions::default()),
            Arc::new(LocalFs::new(LIMIT)),
            Arc::new(provider),
            tx.clone(),
        );
        Self {
            driver,
            tx,
            rx,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    async fn ui(&mut self, ev: UiEvent) -> Vec<Notice> {
        self.driver.handle(Event::Ui(ev)).await;
        self.driver.take_notices()
    }

    /// Handle one background event (open result or fetch result).
    async fn pump(&mut self) -> Vec<Notice> {
        let event = tokio::time::timeout(Duration::from_secs(10), self.rx.recv())
            .await
            .expect("background event")
            .expect("channel open");
        self.driver.handle(event).await;
        self.driver.take_notices()
    }

    async fn next_paint(&mut self) -> PaintNotice {
        loop {
            if let Some(p) = paints(self.pump().await).pop() {
                return p;
            }
        }
    }

    async fn open(&mut self, path: &Path) -> PaintNotice {
        let immediate = self.ui(UiEvent::OpenTab { path: path.to_path_buf() }).await;
        match paints(immediate).pop() {
            Some(p) => p,
            None => self.next_paint().await,
        }
    }

    fn active_lines(&self) -> Vec<String> {
        self.driver.session().tabs().active().unwrap().frame().lines.clone()
    }

    fn active_snapshot(&self) -> core_render::Frame {
        self.driver.session().tabs().active().unwrap().frame().clone()
    }
}

fn paints(notices: Vec<Notice>) -> Vec<PaintNotice> {
    notices
        .into_iter()
        .filter_map(|n| match n {
            Notice::Paint(p) => Some(p),
            _ => None,
        })
        .collect()
}

fn numbered(n: usize) -> String {
    (0..n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
}

fn doc(lines: &[&str]) -> VisualNode {
    VisualNode::group(lines.iter().map(|l| VisualNode::line(*l)).collect())
}

#[tokio::test]
async fn small_file_renders_whole_buffer() {
    let mut h = Harness::new();
    let path = h.write("a.txt", "a\nb\nc");
    let paint = h.open(&path).await;
    assert_eq!(paint.mode, "full");
    assert_eq!((paint.start_line, paint.end_line, paint.total_lines), (0, 3, 3));
    assert!(paint.complete);
    assert_eq!(h.active_lines(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn huge_file_scrolls_virtually() {
    let mut h = Harness::new();
    let path = h.write("huge.log", &numbered(200_000));
    let first = h.open(&path).await;
    assert_eq!(first.mode, "virtual");
    assert_eq!((first.start_line, first.end_line), (0, 50));
    assert_eq!(first.total_lines, 200_000);

    assert!(h.ui(UiEvent::Scroll { offset_px: 50.0 * 20.0 }).await.is_empty());
    let paint = h.next_paint().await;
    assert_eq!((paint.start_line, paint.end_line), (30, 100));
    assert_eq!(paint.leading_spacer_px, 600.0);
    assert_eq!(paint.trailing_spacer_px, (200_000 - 100) as f64 * 20.0);
    assert_eq!(h.active_lines()[0], "line 30");

    // Same offset again: nothing to render or fetch.
    assert!(h.ui(UiEvent::Scroll { offset_px: 1000.0 }).await.is_empty());
    assert_eq!(h.driver.fetches_in_flight(), 0);
}

#[tokio::test]
async fn superseded_fetch_is_never_applied() {
    let mut h = Harness::new();
    let path = h.write("huge.log", &numbered(200_000));
    h.open(&path).await;

    h.ui(UiEvent::Scroll { offset_px: 20_000.0 }).await;
    h.ui(UiEvent::Scroll { offset_px: 100_000.0 }).await;
    assert_eq!(h.driver.fetches_in_flight(), 1);

    let paint = h.next_paint().await;
    assert_eq!(paint.start_line, 4_980);
    assert_eq!(h.active_lines()[0], "line 4980");

    // A result of the first fetch may still be queued; it must not paint.
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), h.rx.recv()).await {
        h.driver.handle(event).await;
        assert!(paints(h.driver.take_notices()).is_empty());
    }
    assert_eq!(h.active_lines()[0], "line 4980");
}

#[tokio::test]
async fn line_split_rebuilds_against_new_total() {
    let mut h = Harness::new();
    let path = h.write("c.txt", "a\nb\nc");
    h.open(&path).await;

    let notices = h.ui(UiEvent::Edit { snapshot: doc(&["a", "b1\nb2", "c"]) }).await;
    let paint = paints(notices).pop().expect("rebuild paint");
    assert_eq!(paint.total_lines, 4);
    assert_eq!((paint.start_line, paint.end_line), (0, 4));

    h.ui(UiEvent::Resize { width: 800.0, height: 40.0 }).await;
    let tab = h.driver.session().tabs().active().unwrap();
    assert_eq!(tab.totals().total_lines, 4);
    assert!(tab.viewport().end_line() <= 4);
}

#[tokio::test]
async fn closing_with_unsaved_edits_keeps_extracted_content() {
    let mut h = Harness::new();
    let path = h.write("e.txt", "one\ntwo");
    h.open(&path).await;
    h.ui(UiEvent::Edit { snapshot: doc(&["one", "2"]) }).await;

    let notices = h
        .ui(UiEvent::CloseTab {
            path: path.clone(),
            snapshot: Some(doc(&["one", "2", "three"])),
        })
        .await;
    assert!(notices.contains(&Notice::Closed { path: path.clone(), dirty: true }));
    let session = h.driver.session();
    assert!(session.tabs().is_empty());
    let entry = session.content_cache().get(&path).unwrap();
    assert_eq!(entry.text, "one\n2\nthree");
    // Disk still has the last saved content.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo");
    assert_eq!(
        session.saveable_content(),
        vec![(path.clone(), "one\n2\nthree".to_string())]
    );
}

#[tokio::test]
async fn save_all_restores_line_endings() {
    let mut h = Harness::new();
    let path = h.write("dos.txt", "x\r\ny\r\nz");
    h.open(&path).await;
    h.ui(UiEvent::Edit { snapshot: doc(&["x", "Y", "z"]) }).await;

    let notices = h.ui(UiEvent::SaveAll { snapshot: None }).await;
    assert!(notices.contains(&Notice::Saved { path: path.clone() }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\r\nY\r\nz");
    assert!(h.driver.session().saveable_content().is_empty());
    assert!(!h.driver.session().tabs().active().unwrap().is_dirty());
}

#[tokio::test]
async fn remote_edit_is_forwarded_and_saved() {
    let mut h = Harness::new();
    let path = h.write("big.txt", &numbered(6_000));
    h.open(&path).await;

    let mut frame = h.active_snapshot();
    frame.lines[1] = "edited".into();
    h.ui(UiEvent::Edit { snapshot: frame.to_nodes() }).await;
    h.ui(UiEvent::SaveAll { snapshot: None }).await;

    let on_disk = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = on_disk.lines().collect();
    assert_eq!(lines.len(), 6_000);
    assert_eq!(&lines[..3], &["line 0", "edited", "line 2"]);
}

#[tokio::test]
async fn dirty_remote_tab_reopens_with_its_edits() {
    let mut h = Harness::new();
    let path = h.write("big.txt", &numbered(6_000));
    h.open(&path).await;
    let mut frame = h.active_snapshot();
    frame.lines[0] = "kept".into();
    h.ui(UiEvent::Edit { snapshot: frame.to_nodes() }).await;
    h.ui(UiEvent::CloseTab { path: path.clone(), snapshot: None }).await;

    let paint = h.open(&path).await;
    assert_eq!(paint.total_lines, 6_000);
    assert_eq!(h.active_lines()[0], "kept");
}

#[tokio::test]
async fn missing_file_reports_open_failure() {
    let mut h = Harness::new();
    let path = h.dir.path().join("nope.txt");
    h.ui(UiEvent::OpenTab { path: path.clone() }).await;
    let notices = h.pump().await;
    assert!(matches!(&notices[..], [Notice::OpenFailed { path: p, .. }] if *p == path));
    assert!(h.driver.session().tabs().is_empty());
    assert!(!h.driver.session().is_opening(&path));
}

#[tokio::test]
async fn switching_tabs_restores_scroll_and_cached_frame() {
    let mut h = Harness::new();
    let small = h.write("small.txt", &numbered(100));
    let huge = h.write("huge.log", &numbered(200_000));
    h.open(&small).await;
    h.open(&huge).await;
    h.ui(UiEvent::Scroll { offset_px: 1000.0 }).await;
    h.next_paint().await;

    let notices = h.ui(UiEvent::ActivateTab { path: small.clone() }).await;
    let restored = paints(notices).pop().expect("single-shot restore");
    assert!(restored.complete);
    assert_eq!(restored.placed_lines, 100);

    let notices = h.ui(UiEvent::ActivateTab { path: huge.clone() }).await;
    let back = paints(notices).pop().expect("resident window repaint");
    assert_eq!(back.start_line, 30);
}

/// Provider whose edits can be switched to fail.
struct FlakyProvider {
    inner: RopeLineProvider,
    reject_edits: Arc<AtomicBool>,
}

impl LineProvider for FlakyProvider {
    async fn open_virtual(&self, path: &Path) -> IoResult<Totals> {
        self.inner.open_virtual(path).await
    }

    async fn adopt_virtual(&self, path: &Path, raw: String) -> IoResult<Totals> {
        self.inner.adopt_virtual(path, raw).await
    }

    async fn get_line_range(&self, path: &Path, range: Range<usize>) -> IoResult<LineRange> {
        self.inner.get_line_range(path, range).await
    }

    async fn replace_lines(&self, path: &Path, range: Range<usize>, lines: Vec<Line>) -> IoResult<Totals> {
        if self.reject_edits.load(Ordering::SeqCst) {
            return Err(IoError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("provider unavailable"),
            });
        }
        self.inner.replace_lines(path, range, lines).await
    }

    async fn save_virtual(&self, path: &Path) -> IoResult<()> {
        self.inner.save_virtual(path).await
    }

    async fn close_virtual(&self, path: &Path) -> IoResult<()> {
        self.inner.close_virtual(path).await
    }
}

#[tokio::test]
async fn rejected_remote_edit_is_kept_and_blocks_save() {
    let reject = Arc::new(AtomicBool::new(false));
    let mut h = Harness::with_provider(FlakyProvider {
        inner: RopeLineProvider::new(LIMIT),
        reject_edits: Arc::clone(&reject),
    });
    let body = numbered(6_000);
    let path = h.write("big.txt", &body);
    h.open(&path).await;

    reject.store(true, Ordering::SeqCst);
    let mut frame = h.active_snapshot();
    frame.lines[1] = "edited".into();
    h.ui(UiEvent::Edit { snapshot: frame.to_nodes() }).await;
    assert!(h.driver.has_unsynced_edits(&path));

    // A fetch must not bring back the provider's older copy.
    h.ui(UiEvent::Scroll { offset_px: 100_000.0 }).await;
    assert!(paints(h.pump().await).is_empty());
    assert_eq!(h.active_lines()[1], "edited");

    let notices = h.ui(UiEvent::SaveAll { snapshot: None }).await;
    assert!(matches!(&notices[..], [Notice::SaveFailed { path: p, .. }] if *p == path));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), body);

    reject.store(false, Ordering::SeqCst);
    let notices = h.ui(UiEvent::SaveAll { snapshot: None }).await;
    assert!(notices.contains(&Notice::Saved { path: path.clone() }));
    assert!(!h.driver.has_unsynced_edits(&path));
    let on_disk = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = on_disk.lines().collect();
    assert_eq!(lines.len(), 6_000);
    assert_eq!(&lines[..3], &["line 0", "edited", "line 2"]);
}

#[tokio::test]
async fn script_replay_settles_before_shutdown() {
    let mut h = Harness::new();
    let small = h.write("a.txt", "a\nb\nc");
    let huge = h.write("huge.log", &numbered(200_000));
    for event in [
        Event::Ui(UiEvent::OpenTab { path: small.clone() }),
        Event::Ui(UiEvent::OpenTab { path: huge.clone() }),
        Event::Ui(UiEvent::Scroll { offset_px: 1000.0 }),
        Event::Shutdown,
    ] {
        h.tx.send(event).await.unwrap();
    }

    let mut notices = Vec::new();
    tokio::time::timeout(
        Duration::from_secs(10),
        h.driver.run(&mut h.rx, |n| notices.push(n)),
    )
    .await
    .expect("loop ends once the script settled");

    let paints = paints(notices);
    assert_eq!(paints.first().map(|p| p.path.clone()), Some(small));
    let last = paints.last().expect("paint for the scrolled tab");
    assert_eq!(last.path, huge);
    assert_eq!((last.start_line, last.end_line, last.total_lines), (30, 100, 200_000));
    assert_eq!(h.driver.fetches_in_flight(), 0);
}

//! Core event types and channel helpers for linewise.
//!
//! Every input to the session loop travels as an [`Event`] over one bounded
//! mpsc channel: UI operations decoded from JSON, results of background line
//! fetches and opens, frame ticks that drive batched rendering, and shutdown.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use core_text::{Language, Line, Totals};
use serde::{Deserialize, Serialize};

mod sources;
pub mod visual;

pub use sources::{AsyncEventSource, EventSourceRegistry, FrameTickSource, JsonLinesSource};
pub use visual::VisualNode;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One bounded channel feeds the session loop. Producers await `send` and therefore park under
// backpressure rather than dropping events; a closed channel is the only failure and is counted.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 8192;

pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static FRAME_TICKS: AtomicU64 = AtomicU64::new(0);
pub static UI_EVENTS_DECODED: AtomicU64 = AtomicU64::new(0);
pub static UI_EVENTS_REJECTED: AtomicU64 = AtomicU64::new(0);

/// Point-in-time copy of the process-wide event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCountersSnapshot {
    pub frame_ticks: u64,
    pub ui_events_decoded: u64,
    pub ui_events_rejected: u64,
    pub channel_send_failures: u64,
}

pub fn counters_snapshot() -> EventCountersSnapshot {
    EventCountersSnapshot {
        frame_ticks: FRAME_TICKS.load(Ordering::Relaxed),
        ui_events_decoded: UI_EVENTS_DECODED.load(Ordering::Relaxed),
        ui_events_rejected: UI_EVENTS_REJECTED.load(Ordering::Relaxed),
        channel_send_failures: CHANNEL_SEND_FAILURES.load(Ordering::Relaxed),
    }
}

/// Top-level event enum consumed by the session loop.
#[derive(Debug, Clone)]
pub enum Event {
    Ui(UiEvent),
    LinesLoaded(LinesLoaded),
    Opened(OpenLoaded),
    /// Periodic tick that advances batched full-buffer rendering.
    FrameTick,
    Shutdown,
}

/// Operations issued by the display layer.
///
/// Wire form is one JSON object per event, tagged by `op`:
/// `{"op":"scroll","offsetPx":1000.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiEvent {
    OpenTab {
        path: PathBuf,
    },
    CloseTab {
        path: PathBuf,
        /// Final visual state of the tab when it is the active one.
        #[serde(default)]
        snapshot: Option<VisualNode>,
    },
    ActivateTab {
        path: PathBuf,
    },
    Scroll {
        offset_px: f64,
    },
    Resize {
        width: f64,
        height: f64,
    },
    Edit {
        snapshot: VisualNode,
    },
    SaveAll {
        #[serde(default)]
        snapshot: Option<VisualNode>,
    },
}

impl UiEvent {
    pub fn op_name(&self) -> &'static str {
        match self {
            UiEvent::OpenTab { .. } => "openTab",
            UiEvent::CloseTab { .. } => "closeTab",
            UiEvent::ActivateTab { .. } => "activateTab",
            UiEvent::Scroll { .. } => "scroll",
            UiEvent::Resize { .. } => "resize",
            UiEvent::Edit { .. } => "edit",
            UiEvent::SaveAll { .. } => "saveAll",
        }
    }
}

/// Decode a single JSON line into a [`UiEvent`].
pub fn decode_ui_event(line: &str) -> Result<UiEvent, serde_json::Error> {
    let decoded = serde_json::from_str::<UiEvent>(line);
    let counter = if decoded.is_ok() {
        &UI_EVENTS_DECODED
    } else {
        &UI_EVENTS_REJECTED
    };
    counter.fetch_add(1, Ordering::Relaxed);
    decoded
}

/// Identity of one issued line fetch. Tickets are unique for the process
/// lifetime and strictly increasing in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

impl Ticket {
    pub fn next() -> Self {
        Ticket(NEXT_TICKET.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lines returned by a provider for one range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLines {
    pub lines: Vec<Line>,
    pub totals: Totals,
    pub language: Language,
}

/// Completion of a background range fetch. Failures carry the rendered error.
#[derive(Debug, Clone)]
pub struct LinesLoaded {
    pub path: PathBuf,
    pub ticket: Ticket,
    pub range: Range<usize>,
    pub result: Result<LoadedLines, String>,
}

/// What a completed open produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedContent {
    /// Small file read whole; raw text as stored on disk.
    Text(String),
    /// Huge file left with the provider; only totals are known.
    Virtual(Totals),
}

#[derive(Debug, Clone)]
pub struct OpenLoaded {
    pub path: PathBuf,
    pub result: Result<OpenedContent, String>,
}

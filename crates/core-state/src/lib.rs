//! Per-buffer state: the tab controller and the content cache.
//!
//! A [`BufferController`] owns one open buffer's line store, viewport,
//! scheduler and materialized frame. Its operations never block and never
//! perform IO; they return [`Effects`] describing what the caller must do
//! next (paint, fetch lines, cancel a fetch, forward remote patches).

use std::ops::Range;
use std::path::PathBuf;

use core_events::Ticket;
use core_render::{LineWindow, RenderMode};
use core_text::RemotePatch;

pub mod content_cache;
pub mod controller;

pub use content_cache::{ContentCache, ContentEntry};
pub use controller::{Backing, BufferController, CloseOutcome, TabPhase};

/// Container size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

/// Range request to issue against the line provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub path: PathBuf,
    pub ticket: Ticket,
    pub range: Range<usize>,
}

/// Summary of what was just placed on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub path: PathBuf,
    pub mode: RenderMode,
    pub window: LineWindow,
    pub total_lines: usize,
    /// Lines actually materialized so far.
    pub placed: Range<usize>,
    pub leading_spacer_px: f64,
    pub trailing_spacer_px: f64,
    pub complete: bool,
}

/// Follow-up work produced by a controller operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    pub paint: Option<Paint>,
    pub fetch: Option<FetchRequest>,
    /// Superseded fetches to abort.
    pub cancel: Vec<Ticket>,
    /// Remote edits to forward, oldest first, before any fetch.
    pub patches: Vec<RemotePatch>,
    pub content_changed: bool,
    pub structural: bool,
    /// A full-buffer frame just became complete.
    pub completed_full: bool,
}

impl Effects {
    /// Fold `later` into `self`; later paints and fetches replace earlier ones.
    pub fn merge(&mut self, later: Effects) {
        if later.paint.is_some() {
            self.paint = later.paint;
        }
        if later.fetch.is_some() {
            self.fetch = later.fetch;
        }
        self.cancel.extend(later.cancel);
        self.patches.extend(later.patches);
        self.content_changed |= later.content_changed;
        self.structural |= later.structural;
        self.completed_full |= later.completed_full;
    }

    pub fn is_empty(&self) -> bool {
        *self == Effects::default()
    }
}

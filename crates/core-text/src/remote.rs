use std::ops::Range;

use tracing::{debug, warn};

use crate::store::{LineStore, PatchEffect, RangeRead, clamp_range};
use crate::{Line, Totals, char_len};

/// Edit recorded against a remote-backed buffer, to be forwarded to the
/// provider in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePatch {
    pub range: Range<usize>,
    pub lines: Vec<Line>,
}

/// Contiguous run of lines currently held in memory.
#[derive(Debug, Clone, Default)]
struct Resident {
    start: usize,
    lines: Vec<Line>,
}

impl Resident {
    fn range(&self) -> Range<usize> {
        self.start..self.start + self.lines.len()
    }

    fn covers(&self, range: &Range<usize>) -> bool {
        let own = self.range();
        range.start >= own.start && range.end <= own.end
    }
}

/// Store for huge files: provider-reported totals plus one resident window.
///
/// Totals are established once on open and then maintained locally as
/// patches are applied; the provider sees the same patches through
/// [`RemoteLineStore::take_pending_patches`].
#[derive(Debug, Clone)]
pub struct RemoteLineStore {
    totals: Totals,
    resident: Resident,
    pending: Vec<RemotePatch>,
}

impl RemoteLineStore {
    pub fn new(totals: Totals) -> Self {
        Self {
            totals: Totals {
                total_lines: totals.total_lines.max(1),
                total_chars: totals.total_chars,
            },
            resident: Resident::default(),
            pending: Vec::new(),
        }
    }

    /// Install lines fetched for `start..start+lines.len()` as the resident window.
    pub fn absorb(&mut self, start: usize, lines: Vec<Line>) {
        debug!(target: "text.store", start, len = lines.len(), "remote_absorb");
        self.resident = Resident { start, lines };
    }

    /// Adopt provider-reported totals (e.g. after a remote reload).
    pub fn set_totals(&mut self, totals: Totals) {
        self.totals = Totals {
            total_lines: totals.total_lines.max(1),
            total_chars: totals.total_chars,
        };
    }

    pub fn resident_range(&self) -> Range<usize> {
        self.resident.range()
    }

    pub fn has_pending_patches(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Keep the resident window aligned with a patch it does not cover.
    /// Patches above it move it by the line delta; overlapping ones drop it.
    fn rebase_resident(&mut self, range: &Range<usize>, inserted: usize) {
        let own = self.resident.range();
        if own.is_empty() || range.start >= own.end {
            return;
        }
        if range.end <= own.start {
            self.resident.start = own.start - range.len() + inserted;
            debug!(target: "text.store", start = self.resident.start, "remote_resident_shifted");
        } else {
            debug!(target: "text.store", start = own.start, end = own.end, "remote_resident_dropped");
            self.resident = Resident::default();
        }
    }

    /// Drain patches not yet forwarded to the provider, oldest first.
    pub fn take_pending_patches(&mut self) -> Vec<RemotePatch> {
        std::mem::take(&mut self.pending)
    }
}

impl LineStore for RemoteLineStore {
    fn totals(&self) -> Totals {
        self.totals
    }

    fn get_range(&self, range: Range<usize>) -> RangeRead {
        let range = clamp_range(range, self.totals.total_lines);
        if range.is_empty() || self.resident.covers(&range) {
            let from = range.start - self.resident.start.min(range.start);
            let lines = self
                .resident
                .lines
                .get(from..from + range.len())
                .map(<[Line]>::to_vec)
                .unwrap_or_default();
            return RangeRead::Ready(lines);
        }
        RangeRead::Missing(range)
    }

    fn patch(&mut self, range: Range<usize>, lines: Vec<Line>) -> PatchEffect {
        let before = self.totals;
        let range = clamp_range(range, self.totals.total_lines);
        let inserted = lines.len();
        let added: usize = lines.iter().map(|l| char_len(l)).sum();
        let removed: usize = if self.resident.covers(&range) {
            let local = range.start - self.resident.start..range.end - self.resident.start;
            self.resident
                .lines
                .splice(local, lines.iter().cloned())
                .map(|l| char_len(&l))
                .sum()
        } else {
            // Old content unknown: only the line count can be tracked exactly.
            warn!(
                target: "text.store",
                start = range.start,
                end = range.end,
                resident_start = self.resident.start,
                resident_len = self.resident.lines.len(),
                "remote_patch_outside_resident"
            );
            self.rebase_resident(&range, inserted);
            0
        };
        let total_lines = (before.total_lines - range.len() + inserted).max(1);
        // Separators are `total_lines - 1`, so their delta follows the line delta.
        let chars = before.total_chars as isize + added as isize - removed as isize
            + total_lines as isize
            - before.total_lines as isize;
        self.totals = Totals {
            total_lines,
            total_chars: chars.max(0) as usize,
        };
        self.pending.push(RemotePatch {
            range: range.clone(),
            lines,
        });
        PatchEffect {
            replaced: range,
            inserted,
            before,
            after: self.totals,
        }
    }
}

use std::ops::Range;

use crate::{Line, Totals};

/// Outcome of a range read against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRead {
    /// All requested lines are resident.
    Ready(Vec<Line>),
    /// The (clamped) range is not resident and must be fetched.
    Missing(Range<usize>),
}

/// Shape of a completed patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEffect {
    /// Replaced range in pre-patch line indices.
    pub replaced: Range<usize>,
    /// Number of lines written in its place.
    pub inserted: usize,
    pub before: Totals,
    pub after: Totals,
}

impl PatchEffect {
    /// True when the patch changed the number of lines.
    pub fn is_structural(&self) -> bool {
        self.before.total_lines != self.after.total_lines
    }

    pub fn line_delta(&self) -> isize {
        self.after.total_lines as isize - self.before.total_lines as isize
    }
}

/// Canonical line storage for one open buffer.
///
/// Ranges are half-open and clamped to `[0, total_lines]`; reading past the end
/// yields fewer lines rather than an error.
pub trait LineStore {
    fn totals(&self) -> Totals;

    fn get_range(&self, range: Range<usize>) -> RangeRead;

    /// Replace `range` with `lines`. An empty store after the patch is
    /// represented as a single empty line.
    fn patch(&mut self, range: Range<usize>, lines: Vec<Line>) -> PatchEffect;

    fn total_lines(&self) -> usize {
        self.totals().total_lines
    }
}

/// Clamp a half-open range into `[0, total]` keeping `start <= end`.
pub fn clamp_range(range: Range<usize>, total: usize) -> Range<usize> {
    let end = range.end.min(total);
    let start = range.start.min(end);
    start..end
}

use std::ops::Range;

use tracing::trace;

use crate::store::{LineStore, PatchEffect, RangeRead, clamp_range};
use crate::{Line, Totals, char_len, join_lines, split_lines};

/// Whole-buffer in-process store.
///
/// Invariant: `lines` is never empty and `content_chars` equals the sum of the
/// char lengths of all lines (separators excluded).
#[derive(Debug, Clone)]
pub struct MemoryLineStore {
    lines: Vec<Line>,
    content_chars: usize,
}

impl Default for MemoryLineStore {
    fn default() -> Self {
        Self {
            lines: vec![Line::new()],
            content_chars: 0,
        }
    }
}

impl MemoryLineStore {
    /// Build from canonical (LF-normalized) text.
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(split_lines(text))
    }

    pub fn from_lines(mut lines: Vec<Line>) -> Self {
        if lines.is_empty() {
            lines.push(Line::new());
        }
        let content_chars = lines.iter().map(|l| char_len(l)).sum();
        Self {
            lines,
            content_chars,
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    /// Canonical text of the whole buffer.
    pub fn text(&self) -> String {
        join_lines(&self.lines)
    }
}

impl LineStore for MemoryLineStore {
    fn totals(&self) -> Totals {
        Totals {
            total_lines: self.lines.len(),
            total_chars: self.content_chars + self.lines.len() - 1,
        }
    }

    fn get_range(&self, range: Range<usize>) -> RangeRead {
        let range = clamp_range(range, self.lines.len());
        RangeRead::Ready(self.lines[range].to_vec())
    }

    fn patch(&mut self, range: Range<usize>, lines: Vec<Line>) -> PatchEffect {
        let before = self.totals();
        let range = clamp_range(range, self.lines.len());
        let inserted = lines.len();
        let added: usize = lines.iter().map(|l| char_len(l)).sum();
        let removed: usize = self
            .lines
            .splice(range.clone(), lines)
            .map(|l| char_len(&l))
            .sum();
        self.content_chars = self.content_chars + added - removed;
        if self.lines.is_empty() {
            self.lines.push(Line::new());
        }
        let after = self.totals();
        trace!(
            target: "text.store",
            start = range.start,
            end = range.end,
            inserted,
            total_lines = after.total_lines,
            "memory_patch"
        );
        PatchEffect {
            replaced: range,
            inserted,
            before,
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totals_of;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_text_has_one_line() {
        let s = MemoryLineStore::from_text("");
        assert_eq!(s.totals(), Totals::new(1, 0));
        assert_eq!(s.get_range(0..10), RangeRead::Ready(vec![String::new()]));
    }

    #[test]
    fn totals_match_canonical_text() {
        let s = MemoryLineStore::from_text("a\nb\nc");
        assert_eq!(s.totals(), Totals::new(3, 5));
    }

    #[test]
    fn patch_same_count_updates_chars() {
        let mut s = MemoryLineStore::from_text("a\nb\nc");
        let eff = s.patch(1..2, vec!["bbb".into()]);
        assert!(!eff.is_structural());
        assert_eq!(s.text(), "a\nbbb\nc");
        assert_eq!(s.totals(), totals_of(s.lines()));
    }

    #[test]
    fn patch_split_line_is_structural() {
        let mut s = MemoryLineStore::from_text("a\nb\nc");
        let eff = s.patch(1..2, vec!["b1".into(), "b2".into()]);
        assert!(eff.is_structural());
        assert_eq!(eff.line_delta(), 1);
        assert_eq!(s.lines(), &["a", "b1", "b2", "c"]);
        assert_eq!(s.totals(), Totals::new(4, "a\nb1\nb2\nc".len()));
    }

    #[test]
    fn patch_removing_everything_leaves_one_empty_line() {
        let mut s = MemoryLineStore::from_text("x\ny");
        s.patch(0..2, Vec::new());
        assert_eq!(s.totals(), Totals::new(1, 0));
        assert_eq!(s.text(), "");
    }

    #[test]
    fn range_read_clamps() {
        let s = MemoryLineStore::from_text("a\nb");
        assert_eq!(s.get_range(1..99), RangeRead::Ready(vec!["b".to_string()]));
        assert_eq!(s.get_range(5..9), RangeRead::Ready(Vec::new()));
    }
}

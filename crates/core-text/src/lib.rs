//! Canonical line model for open buffers.
//!
//! A buffer is an ordered sequence of [`Line`]s. Identity is positional: line
//! `i` is whatever currently sits at index `i`. The model never stores an
//! implicit trailing newline, so the canonical text of a buffer is always
//! `lines.join("\n")` and the following holds for every store:
//!
//! * `total_lines == count('\n' in text) + 1` (the empty text is one empty line).
//! * `total_chars == text.chars().count()` (separators included).
//!
//! Two backings implement [`LineStore`]:
//! * [`MemoryLineStore`]: the whole buffer as a `Vec<Line>`; synchronous.
//! * [`RemoteLineStore`]: totals plus a resident window over an external
//!   provider for huge files. Ranges outside the window are reported missing so
//!   the owner can issue an async fetch.

pub mod language;
pub mod line_ending;
mod memory;
mod remote;
mod store;

pub use language::Language;
pub use line_ending::{LineEnding, NormalizedText, count_lines, normalize_line_endings};
pub use memory::MemoryLineStore;
pub use remote::{RemoteLineStore, RemotePatch};
pub use store::{LineStore, PatchEffect, RangeRead, clamp_range};

/// A single text row without a trailing separator.
pub type Line = String;

/// Separator inserted between lines when producing canonical text.
pub const LINE_SEPARATOR: char = '\n';

/// Line and character totals of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub total_lines: usize,
    pub total_chars: usize,
}

impl Totals {
    pub fn new(total_lines: usize, total_chars: usize) -> Self {
        Self {
            total_lines,
            total_chars,
        }
    }
}

/// Split canonical text into lines. Always yields at least one line.
pub fn split_lines(text: &str) -> Vec<Line> {
    text.split(LINE_SEPARATOR).map(str::to_owned).collect()
}

/// Join lines back into canonical text (one separator per boundary).
pub fn join_lines(lines: &[Line]) -> String {
    let cap = lines.iter().map(String::len).sum::<usize>() + lines.len();
    let mut out = String::with_capacity(cap);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(LINE_SEPARATOR);
        }
        out.push_str(line);
    }
    out
}

/// Char count of a single line.
pub fn char_len(line: &str) -> usize {
    line.chars().count()
}

/// Totals for a line slice as if it were a whole buffer.
pub fn totals_of(lines: &[Line]) -> Totals {
    let content: usize = lines.iter().map(|l| char_len(l)).sum();
    Totals {
        total_lines: lines.len(),
        total_chars: content + lines.len().saturating_sub(1),
    }
}

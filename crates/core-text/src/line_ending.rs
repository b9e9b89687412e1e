//! Line ending detection and LF normalization.
//!
//! Buffers are held LF-only. The dominant style of the source text is
//! remembered so saved content can be written back in the style it was read.

use crate::LINE_SEPARATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// Convert LF-only text back into this style.
    pub fn restore(self, text: &str) -> String {
        match self {
            LineEnding::Lf => text.to_owned(),
            other => text.replace(LINE_SEPARATOR, other.as_str()),
        }
    }
}

/// LF-normalized text plus what was observed in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub normalized: String,
    /// Majority style; ties prefer CRLF, then LF, then CR.
    pub original: LineEnding,
    /// More than one style was present.
    pub mixed: bool,
}

#[derive(Default)]
struct EndingCounts {
    crlf: usize,
    lf: usize,
    cr: usize,
}

impl EndingCounts {
    fn scan(input: &str) -> Self {
        let mut counts = Self::default();
        let mut bytes = input.bytes().peekable();
        while let Some(b) = bytes.next() {
            match b {
                b'\r' if bytes.peek() == Some(&b'\n') => {
                    bytes.next();
                    counts.crlf += 1;
                }
                b'\r' => counts.cr += 1,
                b'\n' => counts.lf += 1,
                _ => {}
            }
        }
        counts
    }

    fn majority(&self) -> LineEnding {
        let mut best = (LineEnding::Lf, 0usize);
        for (style, n) in [
            (LineEnding::Crlf, self.crlf),
            (LineEnding::Lf, self.lf),
            (LineEnding::Cr, self.cr),
        ] {
            if n > best.1 {
                best = (style, n);
            }
        }
        best.0
    }

    fn styles_seen(&self) -> usize {
        [self.crlf, self.lf, self.cr].iter().filter(|n| **n > 0).count()
    }
}

/// Normalize CRLF and lone CR to LF.
pub fn normalize_line_endings(input: &str) -> NormalizedText {
    let counts = EndingCounts::scan(input);
    let normalized = if counts.crlf == 0 && counts.cr == 0 {
        input.to_owned()
    } else {
        input.replace("\r\n", "\n").replace('\r', "\n")
    };
    NormalizedText {
        normalized,
        original: counts.majority(),
        mixed: counts.styles_seen() > 1,
    }
}

/// Line count of raw text as it reads after normalization, without
/// allocating the normalized copy.
pub fn count_lines(input: &str) -> usize {
    let counts = EndingCounts::scan(input);
    counts.crlf + counts.lf + counts.cr + 1
}

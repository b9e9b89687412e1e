//! Line-range provider for files too large to materialize whole.

use std::future::Future;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use core_text::{Language, Line, LineEnding, Totals, clamp_range, normalize_line_endings};
use ropey::Rope;
use tracing::{debug, info, warn};

use crate::error::{IoError, IoResult};
use crate::fs::read_text;

/// Answer to a line-range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRange {
    pub lines: Vec<Line>,
    pub totals: Totals,
    pub language: Language,
}

/// External source of lines for huge files, queried by index range.
///
/// `open_virtual` (or `adopt_virtual`, for text the caller already read)
/// establishes totals up front; every other call requires the path to be
/// open. Ranges past the end are clamped.
pub trait LineProvider: Send + Sync + 'static {
    fn open_virtual(&self, path: &Path) -> impl Future<Output = IoResult<Totals>> + Send;

    /// Open `path` from raw text the caller already read from it.
    fn adopt_virtual(&self, path: &Path, raw: String) -> impl Future<Output = IoResult<Totals>> + Send;

    fn get_line_range(
        &self,
        path: &Path,
        range: Range<usize>,
    ) -> impl Future<Output = IoResult<LineRange>> + Send;

    /// Replace `range` with `lines`, returning the new totals.
    fn replace_lines(
        &self,
        path: &Path,
        range: Range<usize>,
        lines: Vec<Line>,
    ) -> impl Future<Output = IoResult<Totals>> + Send;

    /// Write the document back to its file.
    fn save_virtual(&self, path: &Path) -> impl Future<Output = IoResult<()>> + Send;

    fn close_virtual(&self, path: &Path) -> impl Future<Output = IoResult<()>> + Send;
}

struct VirtualDoc {
    rope: Rope,
    line_ending: LineEnding,
}

impl VirtualDoc {
    fn totals(&self) -> Totals {
        Totals::new(self.rope.len_lines(), self.rope.len_chars())
    }

    fn line(&self, idx: usize) -> Line {
        let mut line = self.rope.line(idx).to_string();
        if line.ends_with('\n') {
            line.pop();
        }
        line
    }

    /// Splice whole lines, keeping exactly one `\n` between neighbours.
    fn splice(&mut self, range: Range<usize>, lines: &[Line]) {
        let total = self.rope.len_lines();
        let joined = lines.join("\n");
        if range.end < total {
            let start = self.rope.line_to_char(range.start);
            let end = self.rope.line_to_char(range.end);
            self.rope.remove(start..end);
            if !lines.is_empty() {
                self.rope.insert(start, &format!("{joined}\n"));
            }
        } else if range.start < range.end {
            let mut start = self.rope.line_to_char(range.start);
            if lines.is_empty() && range.start > 0 {
                // Dropping the tail: the separator before it goes too.
                start -= 1;
            }
            self.rope.remove(start..self.rope.len_chars());
            self.rope.insert(start, &joined);
        } else if !lines.is_empty() {
            let end = self.rope.len_chars();
            self.rope.insert(end, &format!("\n{joined}"));
        }
    }
}

/// In-process provider holding each open document in a rope.
#[derive(Clone)]
pub struct RopeLineProvider {
    docs: Arc<Mutex<AHashMap<PathBuf, VirtualDoc>>>,
    max_file_bytes: u64,
}

impl RopeLineProvider {
    pub fn new(max_file_bytes: u64) -> Self {
        Self {
            docs: Arc::new(Mutex::new(AHashMap::new())),
            max_file_bytes,
        }
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<PathBuf, VirtualDoc>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_doc<T>(&self, path: &Path, f: impl FnOnce(&mut VirtualDoc) -> IoResult<T>) -> IoResult<T> {
        let mut docs = self.lock();
        let doc = docs.get_mut(path).ok_or_else(|| IoError::NotOpen {
            path: path.to_path_buf(),
        })?;
        f(doc)
    }
}

impl LineProvider for RopeLineProvider {
    async fn open_virtual(&self, path: &Path) -> IoResult<Totals> {
        let raw = read_text(path, self.max_file_bytes).await?;
        self.adopt_virtual(path, raw).await
    }

    async fn adopt_virtual(&self, path: &Path, raw: String) -> IoResult<Totals> {
        let doc = tokio::task::spawn_blocking(move || {
            let norm = normalize_line_endings(&raw);
            (Rope::from_str(&norm.normalized), norm.original, norm.mixed)
        })
        .await
        .map_err(|e| IoError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        let (rope, line_ending, mixed) = doc;
        if mixed {
            warn!(target: "io", path = %path.display(), dominant = ?line_ending, "mixed_line_endings");
        }
        let doc = VirtualDoc { rope, line_ending };
        let totals = doc.totals();
        self.lock().insert(path.to_path_buf(), doc);
        info!(
            target: "io",
            path = %path.display(),
            total_lines = totals.total_lines,
            total_chars = totals.total_chars,
            "virtual_opened"
        );
        Ok(totals)
    }

    async fn get_line_range(&self, path: &Path, range: Range<usize>) -> IoResult<LineRange> {
        self.with_doc(path, |doc| {
            let totals = doc.totals();
            let range = clamp_range(range, totals.total_lines);
            let lines = range.clone().map(|i| doc.line(i)).collect();
            Ok(LineRange {
                lines,
                totals,
                language: Language::detect(path),
            })
        })
    }

    async fn replace_lines(
        &self,
        path: &Path,
        range: Range<usize>,
        lines: Vec<Line>,
    ) -> IoResult<Totals> {
        self.with_doc(path, |doc| {
            let total = doc.rope.len_lines();
            if range.start > range.end || range.start > total {
                return Err(IoError::Range {
                    path: path.to_path_buf(),
                    start: range.start,
                    end: range.end,
                    total,
                });
            }
            let range = clamp_range(range, total);
            doc.splice(range.clone(), &lines);
            let totals = doc.totals();
            debug!(
                target: "io",
                path = %path.display(),
                start = range.start,
                end = range.end,
                inserted = lines.len(),
                total_lines = totals.total_lines,
                "virtual_lines_replaced"
            );
            Ok(totals)
        })
    }

    async fn save_virtual(&self, path: &Path) -> IoResult<()> {
        let text = self.with_doc(path, |doc| Ok(doc.line_ending.restore(&doc.rope.to_string())))?;
        tokio::fs::write(path, text)
            .await
            .map_err(|e| IoError::from_io(path, e))?;
        info!(target: "io", path = %path.display(), "virtual_saved");
        Ok(())
    }

    async fn close_virtual(&self, path: &Path) -> IoResult<()> {
        if self.lock().remove(path).is_some() {
            debug!(target: "io", path = %path.display(), "virtual_closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(text: &str) -> VirtualDoc {
        VirtualDoc {
            rope: Rope::from_str(text),
            line_ending: LineEnding::Lf,
        }
    }

    fn lines(v: &[&str]) -> Vec<Line> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splice_middle_same_count() {
        let mut d = doc("a\nb\nc");
        d.splice(1..2, &lines(&["B"]));
        assert_eq!(d.rope.to_string(), "a\nB\nc");
    }

    #[test]
    fn splice_middle_split() {
        let mut d = doc("a\nb\nc");
        d.splice(1..2, &lines(&["b1", "b2"]));
        assert_eq!(d.rope.to_string(), "a\nb1\nb2\nc");
        assert_eq!(d.totals(), Totals::new(4, 10));
    }

    #[test]
    fn splice_delete_middle() {
        let mut d = doc("a\nb\nc");
        d.splice(1..2, &[]);
        assert_eq!(d.rope.to_string(), "a\nc");
    }

    #[test]
    fn splice_tail_replace_and_delete() {
        let mut d = doc("a\nb\nc");
        d.splice(2..3, &lines(&["z"]));
        assert_eq!(d.rope.to_string(), "a\nb\nz");
        d.splice(1..3, &[]);
        assert_eq!(d.rope.to_string(), "a");
        d.splice(0..1, &[]);
        assert_eq!(d.rope.to_string(), "");
        assert_eq!(d.totals(), Totals::new(1, 0));
    }

    #[test]
    fn splice_append_and_insert() {
        let mut d = doc("a");
        d.splice(1..1, &lines(&["b"]));
        assert_eq!(d.rope.to_string(), "a\nb");
        d.splice(0..0, &lines(&["_"]));
        assert_eq!(d.rope.to_string(), "_\na\nb");
    }

    #[test]
    fn line_strips_separator() {
        let d = doc("x\n\ny");
        assert_eq!(d.line(0), "x");
        assert_eq!(d.line(1), "");
        assert_eq!(d.line(2), "y");
    }
}

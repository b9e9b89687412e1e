//! Latest full text per path, independent of what is rendered.
//!
//! Text is held LF-normalized together with the line ending it must be
//! written back with. An entry is dirty from the first edit after a load or
//! save until the next successful save.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use core_text::LineEnding;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub text: String,
    pub line_ending: LineEnding,
    pub dirty: bool,
}

impl ContentEntry {
    /// Text as it should land on disk.
    pub fn saveable(&self) -> String {
        self.line_ending.restore(&self.text)
    }
}

#[derive(Debug, Default)]
pub struct ContentCache {
    entries: AHashMap<PathBuf, ContentEntry>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&ContentEntry> {
        self.entries.get(path)
    }

    /// Record freshly loaded or saved text.
    pub fn put_clean(&mut self, path: &Path, text: String, line_ending: LineEnding) {
        trace!(target: "state.content", path = %path.display(), "content_clean");
        self.entries.insert(
            path.to_path_buf(),
            ContentEntry {
                text,
                line_ending,
                dirty: false,
            },
        );
    }

    /// Record edited text.
    pub fn put_edited(&mut self, path: &Path, text: String, line_ending: LineEnding) {
        trace!(target: "state.content", path = %path.display(), "content_edited");
        self.entries.insert(
            path.to_path_buf(),
            ContentEntry {
                text,
                line_ending,
                dirty: true,
            },
        );
    }

    /// Clear the dirty flag once the text has been written.
    pub fn mark_saved(&mut self, path: &Path) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.dirty = false;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<ContentEntry> {
        self.entries.remove(path)
    }

    /// Dirty entries as `(path, on-disk text)`, sorted by path.
    pub fn saveable(&self) -> Vec<(PathBuf, String)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(p, e)| (p.clone(), e.saveable()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dirty_entries_are_saveable() {
        let mut c = ContentCache::new();
        c.put_clean(Path::new("/a"), "a".into(), LineEnding::Lf);
        c.put_edited(Path::new("/b"), "b1\nb2".into(), LineEnding::Crlf);
        assert_eq!(
            c.saveable(),
            vec![(PathBuf::from("/b"), "b1\r\nb2".to_string())]
        );
        assert!(c.mark_saved(Path::new("/b")));
        assert!(c.saveable().is_empty());
        assert_eq!(c.get(Path::new("/b")).map(|e| e.text.as_str()), Some("b1\nb2"));
    }

    #[test]
    fn mark_saved_unknown_path() {
        let mut c = ContentCache::new();
        assert!(!c.mark_saved(Path::new("/nope")));
    }
}

//! Visual tree to canonical lines.
//!
//! The display layer hands back its edited tree. [`extract_content`] walks
//! it, joining the text of each line node with exactly one `\n` per node
//! boundary; spacers contribute nothing. [`Reconciler::reconcile`] then
//! compares the result with what was materialized and patches the store:
//!
//! * line count changed: one splice over the materialized range (structural);
//! * line count equal: only differing lines are written, adjacent ones
//!   coalesced into a single patch.
//!
//! A tree with a line node nested in another, or with text outside any line
//! node, cannot be mapped line-for-line. Its whole text is then taken without
//! inserted separators as a single line replacing the materialized range.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use core_events::VisualNode;
use core_text::{Line, LineStore, Totals, split_lines};
use tracing::{debug, warn};

/// Canonical content read back from a visual tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub lines: Vec<Line>,
    pub well_formed: bool,
}

pub fn extract_content(root: &VisualNode) -> Extraction {
    let mut collected = Vec::new();
    if collect_lines(root, &mut collected) {
        // Rejoin then split so a line node whose text holds `\n` becomes
        // several lines, exactly as the canonical text reads.
        let text = collected.join("\n");
        let lines = split_lines(&text);
        return Extraction {
            text,
            lines,
            well_formed: true,
        };
    }
    let mut text = String::new();
    root.flat_text(&mut text);
    Extraction {
        lines: vec![text.clone()],
        text,
        well_formed: false,
    }
}

/// Gather line texts in document order. Returns false on a malformed tree.
fn collect_lines(node: &VisualNode, out: &mut Vec<String>) -> bool {
    match node {
        VisualNode::Spacer { .. } => true,
        VisualNode::Text { text } => text.is_empty(),
        VisualNode::Line { children } => {
            let mut line = String::new();
            for child in children {
                match child {
                    VisualNode::Text { text } => line.push_str(text),
                    VisualNode::Spacer { .. } => {}
                    VisualNode::Line { .. } | VisualNode::Group { .. } => {
                        if child.line_count() > 0 {
                            return false;
                        }
                        child.flat_text(&mut line);
                    }
                }
            }
            out.push(line);
            true
        }
        VisualNode::Group { children } => children.iter().all(|c| collect_lines(c, out)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    /// Same line count; these absolute line ranges were rewritten.
    Patched(Vec<Range<usize>>),
    /// Line count changed; windowing must be rebuilt.
    Structural { before: Totals, after: Totals },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub change: Change,
    /// New content of the materialized range.
    pub lines: Vec<Line>,
    pub well_formed: bool,
}

impl ReconcileOutcome {
    pub fn mutated(&self) -> bool {
        !matches!(self.change, Change::Unchanged)
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    runs: AtomicU64,
    patched_lines: AtomicU64,
    structural: AtomicU64,
    fallbacks: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileMetricsSnapshot {
    pub runs: u64,
    pub patched_lines: u64,
    pub structural: u64,
    pub fallbacks: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics_snapshot(&self) -> ReconcileMetricsSnapshot {
        ReconcileMetricsSnapshot {
            runs: self.runs.load(Relaxed),
            patched_lines: self.patched_lines.load(Relaxed),
            structural: self.structural.load(Relaxed),
            fallbacks: self.fallbacks.load(Relaxed),
        }
    }

    /// Read `snapshot` back into `store`. `materialized` is the store range
    /// the snapshot was rendered from and `previous` its lines at that time.
    pub fn reconcile<S>(
        &self,
        store: &mut S,
        materialized: Range<usize>,
        previous: &[Line],
        snapshot: &VisualNode,
    ) -> ReconcileOutcome
    where
        S: LineStore + ?Sized,
    {
        self.runs.fetch_add(1, Relaxed);
        let extraction = extract_content(snapshot);
        if !extraction.well_formed {
            self.fallbacks.fetch_add(1, Relaxed);
            warn!(
                target: "reconcile",
                start = materialized.start,
                end = materialized.end,
                chars = extraction.text.len(),
                "reconcile_ambiguous_tree"
            );
        }
        let new_lines = extraction.lines;

        if new_lines.len() != previous.len() {
            let effect = store.patch(materialized.clone(), new_lines.clone());
            self.structural.fetch_add(1, Relaxed);
            debug!(
                target: "reconcile",
                start = materialized.start,
                end = materialized.end,
                old_count = previous.len(),
                new_count = new_lines.len(),
                total_before = effect.before.total_lines,
                total_after = effect.after.total_lines,
                "reconcile_structural"
            );
            return ReconcileOutcome {
                change: Change::Structural {
                    before: effect.before,
                    after: effect.after,
                },
                lines: new_lines,
                well_formed: extraction.well_formed,
            };
        }

        let runs = changed_runs(previous, &new_lines);
        if runs.is_empty() {
            return ReconcileOutcome {
                change: Change::Unchanged,
                lines: new_lines,
                well_formed: extraction.well_formed,
            };
        }
        let mut patched = Vec::with_capacity(runs.len());
        for run in runs {
            let abs = materialized.start + run.start..materialized.start + run.end;
            store.patch(abs.clone(), new_lines[run.clone()].to_vec());
            self.patched_lines.fetch_add(run.len() as u64, Relaxed);
            patched.push(abs);
        }
        debug!(target: "reconcile", runs = patched.len(), "reconcile_patched");
        ReconcileOutcome {
            change: Change::Patched(patched),
            lines: new_lines,
            well_formed: extraction.well_formed,
        }
    }
}

/// Maximal runs of indices where `old` and `new` differ. Both slices must
/// have the same length.
pub fn changed_runs(old: &[Line], new: &[Line]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for (i, (a, b)) in old.iter().zip(new).enumerate() {
        if a == b {
            continue;
        }
        match runs.last_mut() {
            Some(last) if last.end == i => last.end = i + 1,
            _ => runs.push(i..i + 1),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_text::MemoryLineStore;
    use pretty_assertions::assert_eq;

    fn lines(v: &[&str]) -> Vec<Line> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn doc(v: &[&str]) -> VisualNode {
        VisualNode::group(v.iter().map(|s| VisualNode::line(*s)).collect())
    }

    #[test]
    fn extraction_keeps_empty_and_blank_lines() {
        let e = extract_content(&doc(&["a", "", "  ", "\t"]));
        assert!(e.well_formed);
        assert_eq!(e.text, "a\n\n  \n\t");
        assert_eq!(e.lines, lines(&["a", "", "  ", "\t"]));
    }

    #[test]
    fn spacers_are_skipped() {
        let root = VisualNode::group(vec![
            VisualNode::spacer(100.0),
            VisualNode::line("x"),
            VisualNode::spacer(40.0),
        ]);
        assert_eq!(extract_content(&root).text, "x");
    }

    #[test]
    fn line_with_typed_break_splits() {
        let e = extract_content(&doc(&["a", "b1\nb2", "c"]));
        assert_eq!(e.lines, lines(&["a", "b1", "b2", "c"]));
    }

    #[test]
    fn nested_line_is_ambiguous() {
        let root = VisualNode::group(vec![VisualNode::Line {
            children: vec![VisualNode::text("a"), VisualNode::line("b")],
        }]);
        let e = extract_content(&root);
        assert!(!e.well_formed);
        assert_eq!(e.lines, lines(&["ab"]));
    }

    #[test]
    fn stray_text_is_ambiguous() {
        let root = VisualNode::group(vec![VisualNode::line("a"), VisualNode::text("zz")]);
        let e = extract_content(&root);
        assert!(!e.well_formed);
        assert_eq!(e.text, "azz");
    }

    #[test]
    fn same_count_patches_only_changed_runs() {
        let mut store = MemoryLineStore::from_text("a\nb\nc\nd\ne");
        let prev = lines(&["a", "b", "c", "d", "e"]);
        let r = Reconciler::new();
        let out = r.reconcile(&mut store, 0..5, &prev, &doc(&["a", "B", "C", "d", "E"]));
        assert_eq!(out.change, Change::Patched(vec![1..3, 4..5]));
        assert_eq!(store.text(), "a\nB\nC\nd\nE");
        assert_eq!(r.metrics_snapshot().patched_lines, 3);
    }

    #[test]
    fn unchanged_snapshot_touches_nothing() {
        let mut store = MemoryLineStore::from_text("a\nb");
        let prev = lines(&["a", "b"]);
        let out = Reconciler::new().reconcile(&mut store, 0..2, &prev, &doc(&["a", "b"]));
        assert_eq!(out.change, Change::Unchanged);
        assert!(!out.mutated());
    }

    #[test]
    fn split_line_is_structural() {
        let mut store = MemoryLineStore::from_text("a\nb\nc");
        let prev = lines(&["a", "b", "c"]);
        let out = Reconciler::new().reconcile(&mut store, 0..3, &prev, &doc(&["a", "b1\nb2", "c"]));
        match out.change {
            Change::Structural { before, after } => {
                assert_eq!(before.total_lines, 3);
                assert_eq!(after.total_lines, 4);
            }
            other => panic!("expected structural, got {other:?}"),
        }
        assert_eq!(store.text(), "a\nb1\nb2\nc");
    }

    #[test]
    fn window_edit_splices_only_materialized_range() {
        let mut store = MemoryLineStore::from_lines((0..10).map(|i| i.to_string()).collect());
        let prev = lines(&["3", "4", "5"]);
        Reconciler::new().reconcile(&mut store, 3..6, &prev, &doc(&["3", "4", "4b", "5"]));
        assert_eq!(store.total_lines(), 11);
        assert_eq!(store.line(5), Some("4b"));
        assert_eq!(store.line(10), Some("9"));
    }

    #[test]
    fn ambiguous_tree_replaces_range_with_one_line() {
        let mut store = MemoryLineStore::from_text("a\nb");
        let prev = lines(&["a", "b"]);
        let root = VisualNode::group(vec![VisualNode::text("x"), VisualNode::line("y")]);
        let r = Reconciler::new();
        let out = r.reconcile(&mut store, 0..2, &prev, &root);
        assert!(!out.well_formed);
        assert_eq!(store.text(), "xy");
        assert_eq!(r.metrics_snapshot().fallbacks, 1);
    }
}

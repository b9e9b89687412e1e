//! Ordered set of open tabs with at most one active.
//!
//! Invariants (hold after every public call):
//! * a path appears at most once;
//! * `active` is `None` exactly when there are no tabs, otherwise it indexes
//!   an existing tab.

use std::path::Path;

use core_state::BufferController;

#[derive(Debug, Default)]
pub struct TabManager {
    tabs: Vec<BufferController>,
    active: Option<usize>,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.position(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<&BufferController> {
        self.position(path).map(|i| &self.tabs[i])
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut BufferController> {
        self.position(path).map(|i| &mut self.tabs[i])
    }

    pub fn active(&self) -> Option<&BufferController> {
        self.active.map(|i| &self.tabs[i])
    }

    pub fn active_mut(&mut self) -> Option<&mut BufferController> {
        self.active.map(|i| &mut self.tabs[i])
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.active().is_some_and(|t| t.path() == path)
    }

    /// Append a new tab and make it active. A tab for the same path is
    /// replaced in place.
    pub fn insert(&mut self, tab: BufferController) {
        let idx = match self.position(tab.path()) {
            Some(i) => {
                self.tabs[i] = tab;
                i
            }
            None => {
                self.tabs.push(tab);
                self.tabs.len() - 1
            }
        };
        self.active = Some(idx);
    }

    /// Make `path` active. Returns false when no such tab is open.
    pub fn activate(&mut self, path: &Path) -> bool {
        match self.position(path) {
            Some(i) => {
                self.active = Some(i);
                true
            }
            None => false,
        }
    }

    /// Remove a tab. When it was the active one, its right neighbour (or the
    /// new last tab) becomes active.
    pub fn remove(&mut self, path: &Path) -> Option<BufferController> {
        let idx = self.position(path)?;
        let tab = self.tabs.remove(idx);
        self.active = match self.active {
            _ if self.tabs.is_empty() => None,
            Some(a) if a == idx => Some(idx.min(self.tabs.len() - 1)),
            Some(a) if a > idx => Some(a - 1),
            other => other,
        };
        Some(tab)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferController> {
        self.tabs.iter()
    }

    /// Remove every tab, in display order.
    pub fn drain(&mut self) -> Vec<BufferController> {
        self.active = None;
        std::mem::take(&mut self.tabs)
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.tabs.iter().position(|t| t.path() == path)
    }
}

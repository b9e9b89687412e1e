//! Path-keyed cache of fully materialized line sets.
//!
//! Eviction is FIFO by insertion: `get` does not refresh an entry's position.
//! Sizes are estimated from char counts (chars / 1,048,576 = MB) and tracked
//! internally as integer char totals so the budget check is exact.
//!
//! Invariant: `used_chars <= limit_chars` after every operation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use ahash::AHashMap;
use core_text::{Line, char_len};
use tracing::{debug, trace};

pub const CHARS_PER_MB: f64 = 1_048_576.0;

/// Estimated size of a line set in MB.
pub fn estimate_size_mb(lines: &[Line]) -> f64 {
    chars_of(lines) as f64 / CHARS_PER_MB
}

fn chars_of(lines: &[Line]) -> usize {
    lines.iter().map(|l| char_len(l)).sum()
}

#[derive(Debug)]
struct CacheEntry {
    lines: Vec<Line>,
    chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { evicted: Vec<PathBuf> },
    /// Entry alone exceeds the whole budget; nothing cached for the path.
    TooLarge,
}

#[derive(Debug)]
pub struct RenderCache {
    entries: AHashMap<PathBuf, CacheEntry>,
    /// Insertion order, oldest first.
    order: VecDeque<PathBuf>,
    used_chars: usize,
    limit_chars: usize,
    metrics: RenderCacheMetrics,
}

#[derive(Debug, Default)]
pub struct RenderCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderCacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub rejected: u64,
    pub invalidations: u64,
}

impl RenderCacheMetrics {
    pub fn snapshot(&self) -> RenderCacheMetricsSnapshot {
        RenderCacheMetricsSnapshot {
            hits: self.hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            puts: self.puts.load(Relaxed),
            evictions: self.evictions.load(Relaxed),
            rejected: self.rejected.load(Relaxed),
            invalidations: self.invalidations.load(Relaxed),
        }
    }
}

impl RenderCache {
    pub const DEFAULT_LIMIT_MB: f64 = 50.0;

    pub fn new(limit_mb: f64) -> Self {
        let limit_chars = if limit_mb.is_finite() && limit_mb > 0.0 {
            (limit_mb * CHARS_PER_MB).floor() as usize
        } else {
            0
        };
        Self {
            entries: AHashMap::new(),
            order: VecDeque::new(),
            used_chars: 0,
            limit_chars,
            metrics: RenderCacheMetrics::default(),
        }
    }

    pub fn metrics_snapshot(&self) -> RenderCacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn get(&self, path: &Path) -> Option<&[Line]> {
        match self.entries.get(path) {
            Some(entry) => {
                self.metrics.hits.fetch_add(1, Relaxed);
                Some(&entry.lines)
            }
            None => {
                self.metrics.misses.fetch_add(1, Relaxed);
                None
            }
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Store `lines` for `path`: drop any existing entry, evict oldest
    /// entries until the new one fits, insert as newest.
    pub fn put(&mut self, path: &Path, lines: Vec<Line>) -> PutOutcome {
        self.remove(path);
        let chars = chars_of(&lines);
        if chars > self.limit_chars {
            self.metrics.rejected.fetch_add(1, Relaxed);
            debug!(
                target: "render.cache",
                path = %path.display(),
                size_mb = chars as f64 / CHARS_PER_MB,
                limit_mb = self.limit_mb(),
                "render_cache_entry_too_large"
            );
            return PutOutcome::TooLarge;
        }
        let evicted = self.evict_chars(chars);
        self.used_chars += chars;
        self.order.push_back(path.to_path_buf());
        self.entries
            .insert(path.to_path_buf(), CacheEntry { lines, chars });
        self.metrics.puts.fetch_add(1, Relaxed);
        trace!(
            target: "render.cache",
            path = %path.display(),
            size_mb = chars as f64 / CHARS_PER_MB,
            used_mb = self.used_mb(),
            evicted = evicted.len(),
            "render_cache_put"
        );
        PutOutcome::Stored { evicted }
    }

    /// Evict oldest entries until `required_mb` more would fit.
    pub fn evict(&mut self, required_mb: f64) -> Vec<PathBuf> {
        let required = if required_mb.is_finite() && required_mb > 0.0 {
            (required_mb * CHARS_PER_MB).ceil() as usize
        } else {
            0
        };
        self.evict_chars(required)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        let removed = self.remove(path);
        if removed {
            self.metrics.invalidations.fetch_add(1, Relaxed);
            trace!(target: "render.cache", path = %path.display(), "render_cache_invalidate");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_mb(&self) -> f64 {
        self.used_chars as f64 / CHARS_PER_MB
    }

    pub fn limit_mb(&self) -> f64 {
        self.limit_chars as f64 / CHARS_PER_MB
    }

    /// Paths oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &Path> {
        self.order.iter().map(PathBuf::as_path)
    }

    fn evict_chars(&mut self, required: usize) -> Vec<PathBuf> {
        let mut evicted = Vec::new();
        while self.used_chars + required > self.limit_chars {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.used_chars -= entry.chars;
            }
            self.metrics.evictions.fetch_add(1, Relaxed);
            debug!(target: "render.cache", path = %oldest.display(), "render_cache_evict");
            evicted.push(oldest);
        }
        evicted
    }

    fn remove(&mut self, path: &Path) -> bool {
        let Some(entry) = self.entries.remove(path) else {
            return false;
        };
        self.used_chars -= entry.chars;
        self.order.retain(|p| p != path);
        true
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT_MB)
    }
}

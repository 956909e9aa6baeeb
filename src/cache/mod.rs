// Cache layer
//
// Three bounded, snapshot-aware caches: parsed queries, composite results,
// and detail handles (the detail cache lives with the shaper). A cache
// never returns data from a different snapshot than the caller asked for;
// the snapshot generation is part of the result-cache key, so advancing
// the snapshot invalidates implicitly.

use crate::search::planner::CompositeResult;
use crate::search::query::QueryShape;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Cached outcome of query analysis: classification plus synonym-expanded
/// variants. Keyed by query text and synonym version.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub shape: QueryShape,
    pub expanded_variants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ParsedKey {
    query: String,
    synonym_version: u32,
}

/// A small LRU keyed by hashable keys, bounded by entry count and an
/// approximate byte total.
struct LruCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    max_entries: usize,
    max_bytes: usize,
    current_bytes: usize,
    size_of: fn(&V) -> usize,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    fn new(max_entries: usize, max_bytes: usize, size_of: fn(&V) -> usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries: max_entries.max(1),
            max_bytes: max_bytes.max(1),
            current_bytes: 0,
            size_of,
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        // Move to the back (most recently used)
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.clone());
        }
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: K, value: V) {
        let size = (self.size_of)(&value);

        if let Some(old) = self.entries.remove(&key) {
            self.current_bytes = self.current_bytes.saturating_sub((self.size_of)(&old));
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        }

        self.entries.insert(key.clone(), value);
        self.order.push_back(key);
        self.current_bytes += size;

        while self.entries.len() > self.max_entries || self.current_bytes > self.max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.current_bytes = self.current_bytes.saturating_sub((self.size_of)(&evicted));
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.current_bytes = 0;
    }
}

/// Parsed-query cache
pub struct QueryCache {
    inner: Mutex<LruCache<ParsedKey, ParsedQuery>>,
}

impl QueryCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_entries, max_bytes, |v: &ParsedQuery| {
                v.expanded_variants.iter().map(|s| s.len()).sum::<usize>() + 64
            })),
        }
    }

    pub fn get(&self, query: &str, synonym_version: u32) -> Option<ParsedQuery> {
        let key = ParsedKey {
            query: query.to_string(),
            synonym_version,
        };
        self.inner.lock().ok()?.get(&key)
    }

    pub fn insert(&self, query: &str, synonym_version: u32, parsed: ParsedQuery) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(
                ParsedKey {
                    query: query.to_string(),
                    synonym_version,
                },
                parsed,
            );
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key for one executed search: the snapshot generation pins results to
/// the exact committed state they were computed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub snapshot_generation: u64,
    pub query: String,
    pub filter_fingerprint: String,
    pub sort: String,
    pub limit: usize,
}

pub struct ResultCache {
    inner: Mutex<LruCache<ResultKey, CompositeResult>>,
    inserts_disabled: AtomicBool,
}

impl ResultCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                max_entries,
                max_bytes,
                |v: &CompositeResult| {
                    v.hits
                        .iter()
                        .map(|h| h.path.len() + h.content.as_deref().map_or(0, |c| c.len()) + 128)
                        .sum::<usize>()
                        + 256
                },
            )),
            inserts_disabled: AtomicBool::new(false),
        }
    }

    /// Only returns results computed at exactly this generation
    pub fn get(&self, key: &ResultKey) -> Option<CompositeResult> {
        let hit = self.inner.lock().ok()?.get(key)?;
        debug_assert_eq!(hit.snapshot_generation, key.snapshot_generation);
        Some(hit)
    }

    pub fn insert(&self, key: ResultKey, result: CompositeResult) {
        if self.inserts_disabled.load(Ordering::Relaxed) {
            return;
        }
        if key.snapshot_generation != result.snapshot_generation {
            // Never cache a result under a generation it was not computed at
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(key, result);
        }
    }

    /// Pressure hook: stop accepting new entries
    pub fn set_inserts_disabled(&self, disabled: bool) {
        self.inserts_disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical fingerprint of a filter set for result-cache keys
pub fn filter_fingerprint(filters: &crate::search::SearchFilters) -> String {
    format!(
        "ext={:?};lang={:?};glob={:?};ma={:?};mb={:?};smin={:?};smax={:?}",
        filters.extensions,
        filters.language,
        filters.path_glob,
        filters.modified_after,
        filters.modified_before,
        filters.min_size,
        filters.max_size,
    )
}

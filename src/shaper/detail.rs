// Detail handles
//
// Progressive disclosure parks the full composite result behind an opaque
// 64-bit handle encoding (snapshot generation, query hash, timestamp).
// Handles expire by TTL and under memory pressure; resolution never
// re-executes the search.

use crate::error::{EngineError, EngineResult};
use crate::search::planner::CompositeResult;
use crate::search::SearchHit;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Handle layout: [generation:16][query_hash:24][timestamp:24]
pub fn encode_handle(generation: u64, query: &str, timestamp_s: u64) -> u64 {
    let query_hash = blake3::hash(query.as_bytes());
    let hash24 = u32::from_le_bytes([
        query_hash.as_bytes()[0],
        query_hash.as_bytes()[1],
        query_hash.as_bytes()[2],
        0,
    ]) as u64;

    ((generation & 0xFFFF) << 48) | ((hash24 & 0xFF_FFFF) << 24) | (timestamp_s & 0xFF_FFFF)
}

/// Generation bits of a handle, for diagnostics
pub fn handle_generation(handle: u64) -> u64 {
    (handle >> 48) & 0xFFFF
}

/// What slice of the parked result to return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailSelector {
    /// 1-based inclusive range of hit indices
    Range { start: usize, end: usize },
    /// All hits for one path
    Path(String),
    All,
}

struct DetailEntry {
    result: CompositeResult,
    stored_at: Instant,
}

pub struct DetailCache {
    entries: Mutex<HashMap<u64, DetailEntry>>,
    ttl: Duration,
}

impl DetailCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    /// Park a composite result; returns its handle
    pub fn store(&self, result: CompositeResult, timestamp_s: u64) -> u64 {
        let handle = encode_handle(result.snapshot_generation, &result.query, timestamp_s);
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            handle,
            DetailEntry {
                result,
                stored_at: Instant::now(),
            },
        );
        handle
    }

    /// Resolve a slice of a parked result without re-running the search
    pub fn resolve(&self, handle: u64, selector: &DetailSelector) -> EngineResult<Vec<SearchHit>> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };

        let entry = entries
            .get(&handle)
            .ok_or(EngineError::StaleDetail { handle })?;
        if entry.stored_at.elapsed() >= self.ttl {
            return Err(EngineError::StaleDetail { handle });
        }

        let hits = &entry.result.hits;
        Ok(match selector {
            DetailSelector::All => hits.clone(),
            DetailSelector::Range { start, end } => {
                if *start == 0 || start > end {
                    return Err(EngineError::Validation {
                        reason: format!("invalid detail range {start}..{end}"),
                    });
                }
                let from = start - 1;
                let to = (*end).min(hits.len());
                if from >= hits.len() {
                    Vec::new()
                } else {
                    hits[from..to].to_vec()
                }
            }
            DetailSelector::Path(path) => {
                hits.iter().filter(|h| &h.path == path).cloned().collect()
            }
        })
    }

    /// Evict roughly half the entries, oldest first (memory pressure hook)
    pub fn evict_half(&self) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ages: Vec<(u64, Instant)> =
            entries.iter().map(|(h, e)| (*h, e.stored_at)).collect();
        ages.sort_by_key(|(_, stored)| *stored);

        let to_remove = ages.len() / 2;
        for (handle, _) in ages.into_iter().take(to_remove) {
            entries.remove(&handle);
        }
        debug!("Detail cache evicted {} entries under pressure", to_remove);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

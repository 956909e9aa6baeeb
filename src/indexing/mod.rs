// Dual-write ingest pipeline
//
// One path through here per file change: hash short-circuit, extract,
// symbol-store transaction, index document, batched commit. Per-path
// updates are serialized with an in-memory mutex map; different paths run
// in parallel up to the extractor pool size.
//
// The symbol store commits before the index does. If the process dies in
// the gap, reconciliation (see reconcile.rs) replays the index side from
// the store on next startup.

mod batch;
mod reconcile;

pub use batch::CommitBatcher;
pub use reconcile::{cold_start_events, reconcile_index_with_store, ReconcileReport};

use crate::database::{FileRecord, SymbolStore};
use crate::error::{EngineError, EngineResult};
use crate::extractors::ExtractorPool;
use crate::search::schema::FileDocument;
use crate::search::{IndexWriterHandle, SearchIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// What one ingest call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// File extracted and both stores updated
    Ingested { symbols: usize },
    /// Content hash unchanged; nothing written
    Unchanged,
    /// File removed from both stores
    Deleted,
}

#[derive(Debug, Clone)]
struct QuarantineEntry {
    attempts: u32,
    next_retry: Instant,
    last_error: String,
}

pub struct IngestPipeline {
    workspace_id: String,
    store: Arc<Mutex<SymbolStore>>,
    index: Arc<SearchIndex>,
    writer: Arc<tokio::sync::Mutex<IndexWriterHandle>>,
    extractors: Arc<ExtractorPool>,
    batcher: Arc<Mutex<CommitBatcher>>,
    path_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    quarantine: Mutex<HashMap<PathBuf, QuarantineEntry>>,
    retry_cap: u32,
    max_file_size: u64,
    refuse_ingest: std::sync::atomic::AtomicBool,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: String,
        store: Arc<Mutex<SymbolStore>>,
        index: Arc<SearchIndex>,
        writer: Arc<tokio::sync::Mutex<IndexWriterHandle>>,
        extractors: Arc<ExtractorPool>,
        batch_max_count: usize,
        batch_max_ms: u64,
        retry_cap: u32,
        max_file_size: u64,
    ) -> Self {
        Self {
            workspace_id,
            store,
            index,
            writer,
            extractors,
            batcher: Arc::new(Mutex::new(CommitBatcher::new(batch_max_count, batch_max_ms))),
            path_locks: Mutex::new(HashMap::new()),
            quarantine: Mutex::new(HashMap::new()),
            retry_cap,
            max_file_size,
            refuse_ingest: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Ingest one path. Serialized per path; callers for different paths
    /// can run concurrently.
    pub async fn ingest(&self, path: &Path) -> EngineResult<IngestOutcome> {
        self.ingest_with(path, false).await
    }

    /// Ingest skipping the unchanged-hash short circuit (force rebuild)
    pub async fn reingest(&self, path: &Path) -> EngineResult<IngestOutcome> {
        self.ingest_with(path, true).await
    }

    async fn ingest_with(&self, path: &Path, force: bool) -> EngineResult<IngestOutcome> {
        if self.refuse_ingest.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(EngineError::Backpressure {
                kind: crate::error::PressureKind::Memory,
            });
        }

        let path_lock = self.lock_for(path);
        let _guard = path_lock.lock().await;

        match self.ingest_inner(path, force).await {
            Ok(outcome) => {
                self.clear_quarantine(path);
                Ok(outcome)
            }
            Err(e) => {
                let cause = e.to_string();
                self.record_failure(path, &cause);
                Err(EngineError::IngestFailed {
                    path: path.to_path_buf(),
                    cause,
                })
            }
        }
    }

    async fn ingest_inner(&self, path: &Path, force: bool) -> EngineResult<IngestOutcome> {
        // Step 1: read bytes and hash
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                // Raced with a delete; treat as one
                return self.delete(path).await;
            }
            Err(source) => {
                return Err(EngineError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let path_str = path.to_string_lossy().into_owned();
        let new_hash = crate::extractors::content_hash(&bytes);

        // Step 2: no-op short circuit on unchanged hash
        let stored_hash = {
            let store = Arc::clone(&self.store);
            let path_str = path_str.clone();
            tokio::task::spawn_blocking(move || {
                let store = store.lock().map_err(|_| EngineError::Cancelled)?;
                store.get_file_hash(&path_str)
            })
            .await
            .map_err(|e| EngineError::IngestFailed {
                path: path.to_path_buf(),
                cause: format!("store task failed: {e}"),
            })??
        };

        if !force && stored_hash.as_deref() == Some(new_hash.as_str()) {
            debug!("No-op ingest for {} (hash unchanged)", path_str);
            return Ok(IngestOutcome::Unchanged);
        }

        // Step 3: extraction on the CPU pool
        let extraction = {
            let extractors = Arc::clone(&self.extractors);
            let path_buf = path.to_path_buf();
            let bytes_for_extract = bytes.clone();
            tokio::task::spawn_blocking(move || extractors.extract(&path_buf, &bytes_for_extract))
                .await
                .map_err(|e| EngineError::IngestFailed {
                    path: path.to_path_buf(),
                    cause: format!("extractor task failed: {e}"),
                })?
        };

        let last_modified = file_mtime_ms(path).unwrap_or_else(now_ms);
        let record = FileRecord {
            path: path_str.clone(),
            language: extraction.language.clone(),
            content_hash: extraction.file_hash.clone(),
            size: bytes.len() as i64,
            last_modified,
            symbol_count: extraction.symbols.len() as i64,
            workspace_id: self.workspace_id.clone(),
        };

        // Step 4: symbol-store transaction (replace semantics)
        let symbol_count = extraction.symbols.len();
        {
            let store = Arc::clone(&self.store);
            let record = record.clone();
            let symbols = extraction.symbols.clone();
            let relationships = extraction.relationships.clone();
            tokio::task::spawn_blocking(move || {
                let mut store = store.lock().map_err(|_| EngineError::Cancelled)?;
                store.upsert_file(&record, &symbols, &relationships)
            })
            .await
            .map_err(|e| EngineError::IngestFailed {
                path: path.to_path_buf(),
                cause: format!("store task failed: {e}"),
            })??;
        }

        // Step 5: index document; content is skipped for binary/oversized
        let content = if extraction.skipped.is_some() && extraction.language == "binary" {
            String::new()
        } else if bytes.len() as u64 > self.max_file_size {
            String::new()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let document = FileDocument {
            path: path_str.clone(),
            language: extraction.language.clone(),
            content,
            content_hash: extraction.file_hash.clone(),
            size: bytes.len() as i64,
            last_modified,
            symbols: extraction.symbols,
        };

        {
            let mut writer = self.writer.lock().await;
            writer.add_or_replace(&document)?;
        }

        // Steps 6-7: store already committed; index commit happens on the
        // batch boundary
        self.note_write_and_maybe_commit().await?;

        debug!("Ingested {} ({} symbols)", path_str, symbol_count);
        Ok(IngestOutcome::Ingested {
            symbols: symbol_count,
        })
    }

    /// Delete a path from both stores. Idempotent.
    pub async fn delete(&self, path: &Path) -> EngineResult<IngestOutcome> {
        let path_str = path.to_string_lossy().into_owned();

        {
            let store = Arc::clone(&self.store);
            let path_str = path_str.clone();
            tokio::task::spawn_blocking(move || {
                let mut store = store.lock().map_err(|_| EngineError::Cancelled)?;
                store.delete_file(&path_str)
            })
            .await
            .map_err(|e| EngineError::IngestFailed {
                path: path.to_path_buf(),
                cause: format!("store task failed: {e}"),
            })??;
        }

        {
            let mut writer = self.writer.lock().await;
            writer.delete(&path_str)?;
        }
        self.note_write_and_maybe_commit().await?;

        debug!("Deleted {}", path_str);
        Ok(IngestOutcome::Deleted)
    }

    async fn note_write_and_maybe_commit(&self) -> EngineResult<()> {
        let should_commit = {
            let mut batcher = self.batcher.lock().map_err(|_| EngineError::Cancelled)?;
            batcher.note_op()
        };
        if should_commit {
            self.commit_batch().await?;
        }
        Ok(())
    }

    /// Commit pending index writes now
    pub async fn commit_batch(&self) -> EngineResult<()> {
        let mut writer = self.writer.lock().await;
        writer.commit()?;
        if let Ok(mut batcher) = self.batcher.lock() {
            batcher.committed();
        }
        Ok(())
    }

    /// Periodic tick: commit if the elapsed-time bound fired
    pub async fn tick(&self) -> EngineResult<()> {
        let should = self
            .batcher
            .lock()
            .map(|b| b.elapsed_bound_hit())
            .unwrap_or(false);
        if should {
            self.commit_batch().await?;
        }
        Ok(())
    }

    /// Commit and refresh so readers see everything written so far
    pub async fn flush(&self) -> EngineResult<u64> {
        self.commit_batch().await?;
        self.index.refresh()
    }

    /// Pressure hooks (C12): halve batches, or refuse ingest entirely
    pub fn set_pressure_mode(&self, on: bool) {
        if let Ok(mut batcher) = self.batcher.lock() {
            batcher.set_pressure_mode(on);
        }
    }

    pub fn set_refuse_ingest(&self, on: bool) {
        self.refuse_ingest
            .store(on, std::sync::atomic::Ordering::Relaxed);
        if on {
            warn!("Ingest refused until memory pressure clears");
        }
    }

    /// Whether the watcher should retry this path now, honoring backoff
    pub fn ready_for_retry(&self, path: &Path) -> bool {
        match self.quarantine.lock() {
            Ok(q) => match q.get(path) {
                Some(entry) if entry.attempts > self.retry_cap => false,
                Some(entry) => Instant::now() >= entry.next_retry,
                None => true,
            },
            Err(_) => true,
        }
    }

    /// Paths that exhausted their retries, for observability
    pub fn quarantined_paths(&self) -> Vec<(PathBuf, String)> {
        match self.quarantine.lock() {
            Ok(q) => q
                .iter()
                .filter(|(_, e)| e.attempts > self.retry_cap)
                .map(|(p, e)| (p.clone(), e.last_error.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn pending_ops(&self) -> usize {
        self.batcher.lock().map(|b| b.pending()).unwrap_or(0)
    }

    fn record_failure(&self, path: &Path, cause: &str) {
        let Ok(mut quarantine) = self.quarantine.lock() else {
            return;
        };
        let entry = quarantine
            .entry(path.to_path_buf())
            .or_insert(QuarantineEntry {
                attempts: 0,
                next_retry: Instant::now(),
                last_error: String::new(),
            });
        entry.attempts += 1;
        entry.last_error = cause.to_string();
        // Exponential backoff: 1s, 2s, 4s, ... capped at 60s
        let backoff_secs = 1u64 << entry.attempts.min(6);
        entry.next_retry = Instant::now() + Duration::from_secs(backoff_secs.min(60));

        if entry.attempts > self.retry_cap {
            warn!(
                "Quarantining {} after {} attempts: {}",
                path.display(),
                entry.attempts,
                cause
            );
        }
    }

    fn clear_quarantine(&self, path: &Path) {
        if let Ok(mut quarantine) = self.quarantine.lock() {
            quarantine.remove(path);
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.path_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn file_mtime_ms(path: &Path) -> Option<i64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
}

#[cfg(test)]
pub(crate) fn build_pipeline_for_tests(
    store: SymbolStore,
    index: Arc<SearchIndex>,
) -> EngineResult<IngestPipeline> {
    let writer = index.writer(50_000_000)?;
    let extractors = Arc::new(
        ExtractorPool::new(crate::extractors::ExtractorManager::new(1024 * 1024), 2).map_err(
            |e| EngineError::IngestFailed {
                path: PathBuf::new(),
                cause: e.to_string(),
            },
        )?,
    );
    Ok(IngestPipeline::new(
        store.workspace_id().to_string(),
        Arc::new(Mutex::new(store)),
        index,
        Arc::new(tokio::sync::Mutex::new(writer)),
        extractors,
        100,
        500,
        3,
        1024 * 1024,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SymbolStore;
    use std::fs;
    use tempfile::TempDir;

    async fn pipeline() -> (TempDir, Arc<SearchIndex>, IngestPipeline) {
        let dir = TempDir::new().unwrap();
        let store = SymbolStore::in_memory("ws").unwrap();
        let index = Arc::new(SearchIndex::in_memory().unwrap());
        let pipeline = build_pipeline_for_tests(store, Arc::clone(&index)).unwrap();
        (dir, index, pipeline)
    }

    #[tokio::test]
    async fn test_ingest_then_noop() {
        let (dir, index, pipeline) = pipeline().await;
        let file = dir.path().join("lib.rs");
        fs::write(&file, "pub struct Widget { pub id: u32 }").unwrap();

        let first = pipeline.ingest(&file).await.unwrap();
        assert!(matches!(first, IngestOutcome::Ingested { symbols } if symbols >= 1));

        // Second ingest with no change is a no-op (P1)
        let second = pipeline.ingest(&file).await.unwrap();
        assert_eq!(second, IngestOutcome::Unchanged);

        pipeline.flush().await.unwrap();
        assert_eq!(index.num_docs(), 1);
    }

    #[tokio::test]
    async fn test_modified_file_replaces_symbols() {
        let (dir, index, pipeline) = pipeline().await;
        let file = dir.path().join("lib.rs");

        fs::write(&file, "pub struct OldName;").unwrap();
        pipeline.ingest(&file).await.unwrap();

        fs::write(&file, "pub struct NewName;").unwrap();
        let outcome = pipeline.ingest(&file).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested { .. }));

        pipeline.flush().await.unwrap();
        assert_eq!(index.num_docs(), 1);

        let snapshot = index.snapshot();
        let hit = index
            .hit_by_path(&snapshot, &file.to_string_lossy())
            .unwrap()
            .unwrap();
        let names: Vec<_> = hit.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"NewName"));
        assert!(!names.contains(&"OldName"));
    }

    #[tokio::test]
    async fn test_delete_both_sides() {
        let (dir, index, pipeline) = pipeline().await;
        let file = dir.path().join("gone.rs");
        fs::write(&file, "pub fn short_lived() {}").unwrap();

        pipeline.ingest(&file).await.unwrap();
        pipeline.flush().await.unwrap();
        assert_eq!(index.num_docs(), 1);

        fs::remove_file(&file).unwrap();
        let outcome = pipeline.delete(&file).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Deleted);

        pipeline.flush().await.unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_treated_as_delete() {
        let (dir, _index, pipeline) = pipeline().await;
        let file = dir.path().join("never.rs");

        let outcome = pipeline.ingest(&file).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_refuse_ingest_under_pressure() {
        let (dir, _index, pipeline) = pipeline().await;
        let file = dir.path().join("x.rs");
        fs::write(&file, "pub fn x() {}").unwrap();

        pipeline.set_refuse_ingest(true);
        let err = pipeline.ingest(&file).await.unwrap_err();
        assert_eq!(err.code(), "backpressure");

        pipeline.set_refuse_ingest(false);
        assert!(pipeline.ingest(&file).await.is_ok());
    }

    #[tokio::test]
    async fn test_binary_file_listed_without_symbols() {
        let (dir, index, pipeline) = pipeline().await;
        let file = dir.path().join("blob.rs");
        fs::write(&file, b"\x00\x01\x02\x03").unwrap();

        let outcome = pipeline.ingest(&file).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Ingested { symbols: 0 }));

        pipeline.flush().await.unwrap();
        let snapshot = index.snapshot();
        let hit = index
            .hit_by_path(&snapshot, &file.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(hit.symbol_count, 0);
        assert!(hit.content.is_none(), "binary content is not text-indexed");
    }
}

// Workspace engine
//
// QuarryWorkspace owns every subsystem for one indexed workspace and runs
// the startup sequence: writer lock, symbol store, inverted index,
// crash reconciliation, factor/analyzer registration, then watcher and
// background loops. Tests construct it against temp directories; nothing
// here is process-global.

pub mod lock;
pub mod paths;

pub use lock::WriterLock;
pub use paths::{PathKind, PathResolver, ENGINE_DIR_NAME};

use crate::cache::{filter_fingerprint, QueryCache, ResultCache, ResultKey};
use crate::config::EngineConfig;
use crate::database::SymbolStore;
use crate::error::{EngineError, EngineResult};
use crate::extractors::{ExtractorManager, ExtractorPool};
use crate::health::{HealthSnapshot, MemoryMonitor, PressureLevel};
use crate::indexing::{cold_start_events, reconcile_index_with_store, IngestPipeline};
use crate::search::analyzers::SynonymMap;
use crate::search::{
    CompositeResult, PlanOptions, QueryPlanner, ScorePipeline, SearchIndex,
};
use crate::shaper::{DetailCache, ResponseMode, ResultShaper, ShapedResponse};
use crate::watcher::{FileWatcher, IgnoreRules, WatcherCursor};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a full workspace indexing pass
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub symbols: u64,
    pub duration_ms: u64,
    pub index_size_bytes: u64,
}

pub struct QuarryWorkspace {
    pub root: PathBuf,
    pub config: EngineConfig,
    resolver: PathResolver,
    lock: Mutex<Option<WriterLock>>,

    pub store: Arc<Mutex<SymbolStore>>,
    pub index: Arc<SearchIndex>,
    pub pipeline: Arc<IngestPipeline>,
    pub planner: Arc<QueryPlanner>,
    pub shaper: Arc<ResultShaper>,
    pub result_cache: Arc<ResultCache>,
    pub query_cache: Arc<QueryCache>,
    pub extractors: Arc<ExtractorPool>,
    pub synonyms: Arc<SynonymMap>,

    ignore: Arc<IgnoreRules>,
    memory: Arc<MemoryMonitor>,
    watcher: Mutex<Option<FileWatcher>>,
    cancel: CancellationToken,
    last_refresh: Arc<Mutex<Instant>>,
}

impl QuarryWorkspace {
    /// Open (or initialize) the engine for a workspace root.
    ///
    /// Startup order matters: lock before store, store before index,
    /// reconciliation before any live write.
    pub fn open(root: &Path) -> EngineResult<Self> {
        let resolver = PathResolver::new(root, None)?;
        Self::open_with_resolver(resolver)
    }

    /// Open with an explicit `paths.base` override already applied
    pub fn open_with_base(root: &Path, base: &Path) -> EngineResult<Self> {
        let resolver = PathResolver::new(root, Some(base))?;
        Self::open_with_resolver(resolver)
    }

    fn open_with_resolver(resolver: PathResolver) -> EngineResult<Self> {
        let root = resolver.workspace_root().to_path_buf();
        info!(
            "Opening workspace {} (id {})",
            root.display(),
            resolver.workspace_id()
        );
        resolver.create_layout()?;

        let config_dir = resolver.resolve(PathKind::ConfigDir)?;
        let config = EngineConfig::load_or_create(&config_dir)?;

        // Honor a paths.base override discovered in config (first open used
        // the default location to find the config itself)
        let resolver = match &config.paths.base {
            Some(base) if !resolver.is_engine_state(base) => {
                let resolver = PathResolver::new(&root, Some(base))?;
                resolver.create_layout()?;
                resolver
            }
            _ => resolver,
        };

        // 1. Writer lock, reclaiming stale ones
        let lock_path = resolver.resolve(PathKind::LockFile)?;
        let lock = WriterLock::acquire(&lock_path, config.lock.staleness_ms)?;

        // A cursor from a clean shutdown means (size, mtime) diffing can be
        // trusted; without one, hash comparison catches anything it misses.
        let cursor_path = resolver.resolve(PathKind::WatcherStateFile)?;
        match WatcherCursor::load(&cursor_path) {
            Some(cursor) => info!(
                "Warm restart; previous clean shutdown at {}ms",
                cursor.last_clean_shutdown_ms
            ),
            None => info!("Cold start; no watcher cursor found"),
        }

        // 2. Symbol store with schema verification
        let store_path = resolver.resolve(PathKind::SymbolStoreFile)?;
        let store = Arc::new(Mutex::new(SymbolStore::open(
            &store_path,
            resolver.workspace_id(),
        )?));

        // 3. Inverted index with all fields declared
        let index_dir = resolver.resolve(PathKind::InvertedIndexDir)?;
        let index = Arc::new(SearchIndex::open(&index_dir)?);
        let mut writer = index.writer(config.index.writer_heap_bytes)?;

        // 4. Crash recovery: replay the index side from the store
        {
            let store = store.lock().map_err(|_| EngineError::Cancelled)?;
            reconcile_index_with_store(&store, &index, &mut writer)?;
        }

        // 5. Register factors, analyzers (done at index open), extractors
        let synonyms = Arc::new(SynonymMap::new(config.analyzer.synonyms_enabled));
        let score_pipeline = Arc::new(ScorePipeline::from_config(&config.scoring));
        let extractors = Arc::new(
            ExtractorPool::new(
                ExtractorManager::new(config.extraction.max_file_size),
                config.extractor_threads(),
            )
            .map_err(|e| EngineError::Validation {
                reason: format!("failed to start extractor pool: {e}"),
            })?,
        );

        let pipeline = Arc::new(IngestPipeline::new(
            resolver.workspace_id().to_string(),
            Arc::clone(&store),
            Arc::clone(&index),
            Arc::new(tokio::sync::Mutex::new(writer)),
            Arc::clone(&extractors),
            config.ingest.batch_max_count,
            config.ingest.batch_max_ms,
            config.ingest.retry_cap,
            config.extraction.max_file_size,
        ));

        let query_cache = Arc::new(QueryCache::new(512, 4 << 20));
        let result_cache = Arc::new(ResultCache::new(128, 32 << 20));
        let detail_cache = Arc::new(DetailCache::new(config.shaper.detail_ttl_ms));
        let shaper = Arc::new(ResultShaper::new(
            Arc::clone(&detail_cache),
            config.shaper.token_budget_default,
        ));

        let planner = Arc::new(QueryPlanner::new(
            Arc::clone(&store),
            Arc::clone(&index),
            score_pipeline,
            Arc::clone(&synonyms),
            Arc::clone(&query_cache),
        ));

        let engine_base = resolver.resolve(PathKind::Base)?;
        let ignore = Arc::new(IgnoreRules::new(
            &config.watcher.ignore_patterns,
            engine_base,
            root.clone(),
        )?);

        let memory = Arc::new(MemoryMonitor::new(
            config.memory.pressure_high_bytes,
            config.memory.pressure_critical_bytes,
        ));

        Ok(Self {
            root,
            config,
            resolver,
            lock: Mutex::new(Some(lock)),
            store,
            index,
            pipeline,
            planner,
            shaper,
            result_cache,
            query_cache,
            extractors,
            synonyms,
            ignore,
            memory,
            watcher: Mutex::new(None),
            cancel: CancellationToken::new(),
            last_refresh: Arc::new(Mutex::new(Instant::now())),
        })
    }

    pub fn workspace_id(&self) -> &str {
        self.resolver.workspace_id()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Full workspace indexing pass: walk, diff against the store, ingest.
    /// `force_rebuild` bypasses the unchanged-hash short circuit.
    pub async fn index_workspace(&self, force_rebuild: bool) -> EngineResult<IndexReport> {
        let started = Instant::now();
        let mut report = IndexReport::default();

        let events = {
            let store = self.store.lock().map_err(|_| EngineError::Cancelled)?;
            cold_start_events(&self.root, &store, &self.ignore)?
        };

        let mut paths: Vec<(PathBuf, crate::watcher::ChangeKind)> =
            events.into_iter().map(|e| (e.path, e.kind)).collect();

        if force_rebuild {
            // Everything on disk gets re-extracted, changed or not
            let known: Vec<PathBuf> = {
                let store = self.store.lock().map_err(|_| EngineError::Cancelled)?;
                store.list_files()?.into_iter().map(|f| f.path.into()).collect()
            };
            for path in known {
                if !paths.iter().any(|(p, _)| p == &path) {
                    paths.push((path, crate::watcher::ChangeKind::Modify));
                }
            }
        }

        // Different paths ingest in parallel up to the extractor pool size;
        // the pipeline serializes per path internally.
        let concurrency = self.extractors.workers().max(1);
        let outcomes = stream::iter(paths.into_iter().map(|(path, kind)| {
            let pipeline = Arc::clone(&self.pipeline);
            async move {
                let outcome = match kind {
                    crate::watcher::ChangeKind::Delete => pipeline.delete(&path).await,
                    _ if force_rebuild => pipeline.reingest(&path).await,
                    _ => pipeline.ingest(&path).await,
                };
                (path, outcome)
            }
        }))
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;

        for (path, outcome) in outcomes {
            match outcome {
                Ok(crate::indexing::IngestOutcome::Ingested { symbols }) => {
                    report.files_indexed += 1;
                    report.symbols += symbols as u64;
                }
                Ok(crate::indexing::IngestOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(crate::indexing::IngestOutcome::Deleted) => {}
                Err(e) => {
                    debug!("Index pass skipping {}: {}", path.display(), e);
                    report.files_failed += 1;
                }
            }
        }

        self.pipeline.flush().await?;
        report.duration_ms = started.elapsed().as_millis() as u64;
        report.index_size_bytes = self.index_size_bytes();

        info!(
            "Indexed {} files ({} unchanged, {} failed) in {}ms",
            report.files_indexed, report.files_unchanged, report.files_failed, report.duration_ms
        );
        Ok(report)
    }

    /// Run one search through the caches, the planner, and the shaper
    pub async fn search(
        &self,
        query: &str,
        options: PlanOptions,
        token_budget: Option<usize>,
        mode: ResponseMode,
    ) -> EngineResult<ShapedResponse> {
        let composite = self.search_composite(query, options).await?;
        Ok(self.shaper.shape(composite, token_budget, mode))
    }

    /// The unshapen composite result, cached per snapshot
    pub async fn search_composite(
        &self,
        query: &str,
        options: PlanOptions,
    ) -> EngineResult<CompositeResult> {
        let key = ResultKey {
            snapshot_generation: self.index.current_generation(),
            query: query.to_string(),
            filter_fingerprint: filter_fingerprint(&options.filters),
            sort: format!("{:?}", options.mode),
            limit: options.limit,
        };

        if let Some(cached) = self.result_cache.get(&key) {
            debug!("Result cache hit for '{}'", query);
            return Ok(cached);
        }

        let cancel = self.cancel.child_token();
        let composite = self.planner.plan_and_execute(query, options, cancel).await?;

        let key = ResultKey {
            snapshot_generation: composite.snapshot_generation,
            ..key
        };
        self.result_cache.insert(key, composite.clone());
        Ok(composite)
    }

    /// Default plan options derived from config
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            deadline: Duration::from_millis(self.config.search.default_deadline_ms),
            limit: self.config.search.default_max_results,
            ..Default::default()
        }
    }

    /// Start the watcher with cold-start reconciliation events queued first
    pub fn start_watching(&self) -> EngineResult<()> {
        let mut guard = self.watcher.lock().map_err(|_| EngineError::Cancelled)?;
        if guard.is_some() {
            return Ok(());
        }

        let events = {
            let store = self.store.lock().map_err(|_| EngineError::Cancelled)?;
            cold_start_events(&self.root, &store, &self.ignore)?
        };

        let mut watcher = FileWatcher::new(
            self.root.clone(),
            Arc::clone(&self.ignore),
            self.config.watcher.debounce_ms,
            self.config.watcher.event_queue_cap,
        );
        watcher.enqueue_all(events);
        watcher.start(Arc::clone(&self.pipeline), self.cancel.child_token())?;
        *guard = Some(watcher);
        Ok(())
    }

    /// Spawn the NRT refresh loop, the commit tick, and the health loop
    pub fn spawn_background_tasks(&self) {
        let refresh_interval = Duration::from_millis(self.config.index.refresh_interval_ms.max(50));
        let index = Arc::clone(&self.index);
        let last_refresh = Arc::clone(&self.last_refresh);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(refresh_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        if let Err(e) = index.refresh() {
                            warn!("Index refresh failed: {}", e);
                        } else if let Ok(mut last) = last_refresh.lock() {
                            *last = Instant::now();
                        }
                    }
                }
            }
        });

        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.cancel.child_token();
        let commit_tick = Duration::from_millis((self.config.ingest.batch_max_ms / 2).max(50));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(commit_tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        if let Err(e) = pipeline.tick().await {
                            warn!("Commit tick failed: {}", e);
                        }
                    }
                }
            }
        });

        let memory = Arc::clone(&self.memory);
        let shaper = Arc::clone(&self.shaper);
        let result_cache = Arc::clone(&self.result_cache);
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        apply_pressure_policy(&memory, &shaper, &result_cache, &pipeline);
                    }
                }
            }
        });
    }

    /// Map the current pressure level onto the documented reactions
    pub fn apply_pressure_policy(&self) {
        apply_pressure_policy(&self.memory, &self.shaper, &self.result_cache, &self.pipeline);
    }

    /// Structured health sample for the health operations
    pub fn health_snapshot(&self) -> EngineResult<HealthSnapshot> {
        let (rss, pressure) = self.memory.check();
        let (files, symbols, relationships) = {
            let store = self.store.lock().map_err(|_| EngineError::Cancelled)?;
            store.counts()?
        };
        let files_by_language = {
            let store = self.store.lock().map_err(|_| EngineError::Cancelled)?;
            store.files_by_language()?
        };

        let snapshot_age_ms = self
            .last_refresh
            .lock()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let watcher_queue_depth = self
            .watcher
            .lock()
            .ok()
            .and_then(|w| w.as_ref().map(|w| w.queue_depth()))
            .unwrap_or(0);

        Ok(HealthSnapshot {
            healthy: pressure != PressureLevel::Critical,
            snapshot_generation: self.index.current_generation(),
            snapshot_age_ms,
            pending_ingest_ops: self.pipeline.pending_ops(),
            watcher_queue_depth,
            extractor_workers: self.extractors.workers(),
            rss_bytes: rss,
            pressure,
            store_files: files,
            store_symbols: symbols,
            store_relationships: relationships,
            index_docs: self.index.num_docs(),
            quarantined_files: self
                .pipeline
                .quarantined_paths()
                .into_iter()
                .map(|(p, cause)| format!("{}: {}", p.display(), cause))
                .collect(),
            files_by_language,
        })
    }

    fn index_size_bytes(&self) -> u64 {
        let Ok(index_dir) = self.resolver.resolve(PathKind::InvertedIndexDir) else {
            return 0;
        };
        walkdir::WalkDir::new(index_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    /// Drain, flush, release readers and the writer lock. Safe to call once
    /// even while background tasks still hold references; they observe the
    /// cancellation token and stop.
    pub async fn shutdown(&self) -> EngineResult<()> {
        info!("Shutting down workspace {}", self.root.display());
        self.cancel.cancel();

        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(mut watcher) = guard.take() {
                watcher.stop();
            }
        }

        // Flush within a grace deadline; anything beyond it is picked up by
        // cold-start reconciliation next launch
        match tokio::time::timeout(Duration::from_secs(10), self.pipeline.flush()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Flush during shutdown failed: {}", e),
            Err(_) => warn!("Shutdown flush exceeded grace deadline"),
        }

        // Record the clean shutdown so the next start knows its cold-start
        // diff runs against fully flushed state
        if let Ok(cursor_path) = self.resolver.resolve(PathKind::WatcherStateFile) {
            let cursor = WatcherCursor {
                last_clean_shutdown_ms: chrono::Utc::now().timestamp_millis(),
            };
            if let Err(e) = cursor.save(&cursor_path) {
                warn!("Failed to persist watcher cursor: {}", e);
            }
        }

        if let Ok(mut guard) = self.lock.lock() {
            if let Some(lock) = guard.take() {
                lock.release();
            }
        }
        Ok(())
    }
}

/// The documented pressure reactions, shared by the health loop and the
/// explicit health checks
fn apply_pressure_policy(
    memory: &MemoryMonitor,
    shaper: &ResultShaper,
    result_cache: &ResultCache,
    pipeline: &IngestPipeline,
) {
    let (_rss, level) = memory.check();
    match level {
        PressureLevel::Normal => {
            shaper.set_pressure(false);
            result_cache.set_inserts_disabled(false);
            pipeline.set_pressure_mode(false);
            pipeline.set_refuse_ingest(false);
        }
        PressureLevel::High => {
            shaper.detail_cache().evict_half();
            result_cache.set_inserts_disabled(true);
            pipeline.set_pressure_mode(true);
            shaper.set_pressure(true);
            pipeline.set_refuse_ingest(false);
        }
        PressureLevel::Critical => {
            shaper.detail_cache().evict_half();
            result_cache.set_inserts_disabled(true);
            pipeline.set_pressure_mode(true);
            shaper.set_pressure(true);
            pipeline.set_refuse_ingest(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn workspace_with_sources() -> (TempDir, Arc<QuarryWorkspace>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/session.rs"),
            "/// Session bookkeeping.\npub struct SessionManager { live: u32 }\n\nimpl SessionManager {\n    pub fn renew(&mut self) {}\n}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("src/billing.rs"),
            "pub fn charge_card() { /* SessionManager mentioned */ }\n",
        )
        .unwrap();

        let engine = Arc::new(QuarryWorkspace::open(dir.path()).unwrap());
        engine.index_workspace(false).await.unwrap();
        (dir, engine)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_index_and_search() {
        let (_dir, engine) = workspace_with_sources().await;

        let mut options = engine.plan_options();
        options.deadline = Duration::from_millis(5_000);
        let composite = engine
            .search_composite("SessionManager", options)
            .await
            .unwrap();

        assert!(!composite.hits.is_empty());
        assert!(composite.hits[0].path.ends_with("session.rs"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_result_cache_round_trip() {
        let (_dir, engine) = workspace_with_sources().await;

        let mut options = engine.plan_options();
        options.deadline = Duration::from_millis(5_000);
        let first = engine
            .search_composite("SessionManager", options.clone())
            .await
            .unwrap();
        let second = engine
            .search_composite("SessionManager", options)
            .await
            .unwrap();

        assert_eq!(first.snapshot_generation, second.snapshot_generation);
        assert_eq!(first.hits.len(), second.hits.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_health_snapshot_counts() {
        let (_dir, engine) = workspace_with_sources().await;
        let health = engine.health_snapshot().unwrap();

        assert!(health.healthy);
        assert_eq!(health.store_files, 2);
        assert!(health.store_symbols >= 2);
        assert_eq!(health.index_docs, 2);
        assert!(health.rss_bytes > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_open_after_shutdown() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.rs"), "pub fn one() {}").unwrap();

        {
            let engine = Arc::new(QuarryWorkspace::open(dir.path()).unwrap());
            engine.index_workspace(false).await.unwrap();
            engine.shutdown().await.unwrap();
        }

        // Lock released and state intact on reopen
        let engine = QuarryWorkspace::open(dir.path()).unwrap();
        let health = engine.health_snapshot().unwrap();
        assert_eq!(health.store_files, 1);
        assert_eq!(health.index_docs, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_incremental_reindex_is_noop() {
        let (_dir, engine) = workspace_with_sources().await;

        let report = engine.index_workspace(false).await.unwrap();
        assert_eq!(report.files_indexed, 0, "unchanged files are no-ops");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_force_rebuild_reindexes() {
        let (_dir, engine) = workspace_with_sources().await;

        let report = engine.index_workspace(true).await.unwrap();
        assert_eq!(report.files_indexed, 2);
    }
}

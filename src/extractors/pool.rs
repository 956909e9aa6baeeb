// Extractor pool
//
// Bounded worker set for CPU-bound extraction. Each worker keeps its own
// tree-sitter parsers (thread-local), so acquiring one is lock-free.
// Grammars are loaded eagerly on every worker at pool construction.

use crate::extractors::{warm_parsers, ExtractionResult, ExtractorManager};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ExtractorPool {
    pool: Arc<ThreadPool>,
    manager: ExtractorManager,
    workers: usize,
}

impl ExtractorPool {
    pub fn new(manager: ExtractorManager, workers: usize) -> anyhow::Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("quarry-extract-{i}"))
            .build()?;

        // Eager grammar loading on every worker
        pool.broadcast(|_| warm_parsers());
        info!("Extractor pool started with {} workers", workers);

        Ok(Self {
            pool: Arc::new(pool),
            manager,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn manager(&self) -> &ExtractorManager {
        &self.manager
    }

    /// Extract a single file's bytes on the pool
    pub fn extract(&self, path: &PathBuf, bytes: &[u8]) -> ExtractionResult {
        let manager = self.manager.clone();
        self.pool.install(|| manager.extract(path, bytes))
    }

    /// Extract many files in parallel. Files that cannot be read are
    /// reported back with the error instead of aborting the batch.
    pub fn extract_files(
        &self,
        paths: Vec<PathBuf>,
    ) -> Vec<(PathBuf, std::io::Result<ExtractionResult>)> {
        debug!("Extracting {} files on {} workers", paths.len(), self.workers);
        self.pool.install(|| {
            paths
                .into_par_iter()
                .map(|path| {
                    let outcome = std::fs::read(&path)
                        .map(|bytes| self.manager.extract(&path, &bytes));
                    (path, outcome)
                })
                .collect()
        })
    }
}

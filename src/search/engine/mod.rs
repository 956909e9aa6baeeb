// Search index lifecycle
//
// One tantivy index per workspace with a single writer and snapshot-stable
// readers. Readers refresh on an interval (NRT), not per commit; every
// successful reload bumps a generation counter that snapshot-keyed caches
// and detail handles embed.

mod queries;
mod result;
mod writer;

pub use queries::{KindFacets, QueryMode, SearchFilters};
pub use result::{SearchHit, Tier};
pub use writer::IndexWriterHandle;

use crate::error::EngineResult;
use crate::search::analyzers::register_analyzers;
use crate::search::schema::DocumentSchema;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tantivy::directory::MmapDirectory;
use tantivy::query::TermQuery;
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher, Term};
use tracing::{debug, info, warn};

/// Sentinel terms the warmers run after every refresh to page in postings
const WARMER_TERMS: &[&str] = &["main", "config", "test", "error"];

/// A consistent view of the index: a searcher plus the generation it was
/// taken at. Every branch of one query runs against a single snapshot.
#[derive(Clone)]
pub struct Snapshot {
    pub searcher: Searcher,
    pub generation: u64,
}

pub struct SearchIndex {
    index: Index,
    schema: DocumentSchema,
    reader: IndexReader,
    generation: Arc<AtomicU64>,
}

impl SearchIndex {
    /// Open or create the index at `dir`
    pub fn open(dir: &Path) -> EngineResult<Self> {
        let schema = DocumentSchema::build();
        let directory = MmapDirectory::open(dir).map_err(tantivy::TantivyError::from)?;
        let index = Index::open_or_create(directory, schema.schema().clone())?;
        Self::from_index(index, schema)
    }

    /// RAM-backed index for tests
    pub fn in_memory() -> EngineResult<Self> {
        let schema = DocumentSchema::build();
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: DocumentSchema) -> EngineResult<Self> {
        register_analyzers(&index);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        info!("Search index open ({} docs)", reader.searcher().num_docs());
        Ok(Self {
            index,
            schema,
            reader,
            generation: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    /// Create the single writer handle. The caller owns exclusivity (I4);
    /// tantivy itself enforces it with a directory lock.
    pub fn writer(&self, heap_bytes: usize) -> EngineResult<IndexWriterHandle> {
        IndexWriterHandle::new(&self.index, self.schema.clone(), heap_bytes)
    }

    /// Reload the reader, bump the snapshot generation, and run warmers.
    /// Readers acquired before this call stay valid on their old snapshot.
    pub fn refresh(&self) -> EngineResult<u64> {
        self.reader.reload()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.run_warmers();
        debug!(
            "Index refreshed to generation {} ({} docs)",
            generation,
            self.reader.searcher().num_docs()
        );
        Ok(generation)
    }

    /// Current snapshot without forcing a refresh
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            searcher: self.reader.searcher(),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Execute a small fixed set of sentinel queries so the first real
    /// query after a refresh does not pay the page-in cost.
    fn run_warmers(&self) {
        let searcher = self.reader.searcher();
        for term_text in WARMER_TERMS {
            let term = Term::from_field_text(self.schema.fields.all, term_text);
            let query = TermQuery::new(term, IndexRecordOption::Basic);
            if let Err(e) = searcher.search(&query, &tantivy::collector::Count) {
                warn!("Warmer query '{}' failed: {}", term_text, e);
            }
        }
    }
}

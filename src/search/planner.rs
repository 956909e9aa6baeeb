// Query planner
//
// Classifies the query, fans out across storage tiers in parallel, and
// merges. Every branch runs against the same snapshot, owns its own
// deadline, and reports per-tier outcomes so partial results are labelled
// rather than silently dropped.

use crate::cache::{ParsedQuery, QueryCache};
use crate::database::SymbolStore;
use crate::error::{EngineError, EngineResult};
use crate::extractors::{Symbol, SymbolKind};
use crate::search::analyzers::SynonymMap;
use crate::search::engine::{
    QueryMode, SearchFilters, SearchHit, SearchIndex, Snapshot, Tier,
};
use crate::search::query::{classify, exact_lookup_candidates, wants_literal_tier, QueryShape};
use crate::search::scoring::{ScorePipeline, ScoringContext};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options for one planner run
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub mode: QueryMode,
    pub filters: SearchFilters,
    pub limit: usize,
    /// Per-branch deadline
    pub deadline: Duration,
    pub collect_facets: bool,
    pub kind_filter: Option<SymbolKind>,
    pub language_filter: Option<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            mode: QueryMode::Standard,
            filters: SearchFilters::default(),
            limit: 50,
            deadline: Duration::from_millis(100),
            collect_facets: false,
            kind_filter: None,
            language_filter: None,
        }
    }
}

/// Per-tier execution record
#[derive(Debug, Clone)]
pub struct TierOutcome {
    pub tier: Tier,
    pub hits: usize,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Merged output of one planner run
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub tiers: Vec<TierOutcome>,
    pub snapshot_generation: u64,
    pub facets: Vec<(String, u64)>,
}

pub struct QueryPlanner {
    store: Arc<Mutex<SymbolStore>>,
    index: Arc<SearchIndex>,
    pipeline: Arc<ScorePipeline>,
    synonyms: Arc<SynonymMap>,
    query_cache: Arc<QueryCache>,
}

impl QueryPlanner {
    pub fn new(
        store: Arc<Mutex<SymbolStore>>,
        index: Arc<SearchIndex>,
        pipeline: Arc<ScorePipeline>,
        synonyms: Arc<SynonymMap>,
        query_cache: Arc<QueryCache>,
    ) -> Self {
        Self {
            store,
            index,
            pipeline,
            synonyms,
            query_cache,
        }
    }

    /// Classification plus synonym expansion, cached per (query, synonym
    /// version)
    fn parse_query(&self, query: &str) -> ParsedQuery {
        let version = self.synonyms.version();
        if let Some(parsed) = self.query_cache.get(query, version) {
            return parsed;
        }
        let parsed = ParsedQuery {
            shape: classify(query),
            expanded_variants: self.synonyms.expand_query(query),
        };
        self.query_cache.insert(query, version, parsed.clone());
        parsed
    }

    /// Classify, fan out, merge. Cancelling the token cancels every branch.
    pub async fn plan_and_execute(
        &self,
        query: &str,
        options: PlanOptions,
        cancel: CancellationToken,
    ) -> EngineResult<CompositeResult> {
        let parsed = self.parse_query(query);
        let shape = parsed.shape;
        debug!("Planned query '{}' as {:?}", query, shape);

        // One snapshot for every branch of this query
        let snapshot = self.index.snapshot();
        let generation = snapshot.generation;

        let run_exact = matches!(shape, QueryShape::SymbolLike);
        let run_literal = matches!(shape, QueryShape::Syntactic) || wants_literal_tier(query);

        let exact_branch = self.exact_branch(query, &options, &cancel, run_exact);
        let scored_branch =
            self.scored_branch(query, &parsed.expanded_variants, &snapshot, &options, &cancel);
        let literal_branch = self.literal_branch(query, &snapshot, &options, &cancel, run_literal);

        let (exact, scored, literal) = tokio::join!(exact_branch, scored_branch, literal_branch);

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut tiers = Vec::new();
        let mut merged: Vec<SearchHit> = Vec::new();
        let mut seen: HashSet<(String, Option<u32>)> = HashSet::new();

        let mut absorb = |outcome: BranchResult, tiers: &mut Vec<TierOutcome>| {
            tiers.push(TierOutcome {
                tier: outcome.tier,
                hits: outcome.hits.len(),
                elapsed_ms: outcome.elapsed_ms,
                error: outcome.error,
            });
            for hit in outcome.hits {
                if seen.insert(hit.dedup_key()) {
                    merged.push(hit);
                }
            }
        };

        if let Some(outcome) = exact {
            absorb(outcome, &mut tiers);
        }
        if let Some(outcome) = scored {
            absorb(outcome, &mut tiers);
        }
        if let Some(outcome) = literal {
            absorb(outcome, &mut tiers);
        }

        merged.truncate(options.limit);

        let facets = if options.collect_facets {
            self.index
                .kind_facets(&snapshot, query)
                .map(|f| f.counts)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(CompositeResult {
            query: query.to_string(),
            hits: merged,
            tiers,
            snapshot_generation: generation,
            facets,
        })
    }

    /// Exact symbol lookup against the store, with case-variant and synonym
    /// fallbacks when the literal name misses
    async fn exact_branch(
        &self,
        query: &str,
        options: &PlanOptions,
        cancel: &CancellationToken,
        enabled: bool,
    ) -> Option<BranchResult> {
        if !enabled {
            return None;
        }

        let store = Arc::clone(&self.store);
        let synonyms = Arc::clone(&self.synonyms);
        let query = query.to_string();
        let kind_filter = options.kind_filter;
        let language_filter = options.language_filter.clone();
        let limit = options.limit;

        let work = tokio::task::spawn_blocking(move || -> EngineResult<Vec<SearchHit>> {
            let store = store.lock().map_err(|_| EngineError::Cancelled)?;

            let mut candidates = exact_lookup_candidates(&query);
            for extra in synonyms.expand(&query) {
                if !candidates.contains(&extra) {
                    candidates.push(extra);
                }
            }

            for candidate in candidates {
                let symbols = store.query_symbols(
                    &candidate,
                    kind_filter,
                    language_filter.as_deref(),
                    limit,
                )?;
                if !symbols.is_empty() {
                    return Ok(symbols
                        .into_iter()
                        .enumerate()
                        .map(|(rank, s)| symbol_to_hit(s, rank))
                        .collect());
                }
            }
            Ok(Vec::new())
        });

        Some(Self::run_branch(Tier::Exact, options.deadline, cancel, work).await)
    }

    /// Relevance-scored search with synonym expansion and the factor pipeline
    async fn scored_branch(
        &self,
        query: &str,
        expanded_variants: &[String],
        snapshot: &Snapshot,
        options: &PlanOptions,
        cancel: &CancellationToken,
    ) -> Option<BranchResult> {
        let index = Arc::clone(&self.index);
        let pipeline = Arc::clone(&self.pipeline);
        let snapshot = snapshot.clone();
        let query = query.to_string();
        let expanded = expanded_variants.join(" ");
        let mode = options.mode;
        let filters = options.filters.clone();
        let limit = options.limit;

        let work = tokio::task::spawn_blocking(move || -> EngineResult<Vec<SearchHit>> {
            // Synonym variants only widen standard queries; other modes take
            // the text verbatim
            let search_text = if mode == QueryMode::Standard && !expanded.is_empty() {
                expanded
            } else {
                query.clone()
            };

            let mut hits =
                index.search_scored(&snapshot, &search_text, mode, &filters, limit.max(20) * 2)?;

            let ctx = ScoringContext::new(&query, chrono::Utc::now().timestamp_millis());
            pipeline.apply(&mut hits, &ctx);
            hits.truncate(limit);
            Ok(hits)
        });

        Some(Self::run_branch(Tier::Scored, options.deadline, cancel, work).await)
    }

    /// Literal phrase tier for syntax-heavy queries
    async fn literal_branch(
        &self,
        query: &str,
        snapshot: &Snapshot,
        options: &PlanOptions,
        cancel: &CancellationToken,
        enabled: bool,
    ) -> Option<BranchResult> {
        if !enabled {
            return None;
        }

        let index = Arc::clone(&self.index);
        let snapshot = snapshot.clone();
        let query = query.to_string();
        let filters = options.filters.clone();
        let limit = options.limit;

        let work = tokio::task::spawn_blocking(move || -> EngineResult<Vec<SearchHit>> {
            index.literal_search(&snapshot, &query, &filters, limit)
        });

        Some(Self::run_branch(Tier::Literal, options.deadline, cancel, work).await)
    }

    async fn run_branch(
        tier: Tier,
        deadline: Duration,
        cancel: &CancellationToken,
        work: tokio::task::JoinHandle<EngineResult<Vec<SearchHit>>>,
    ) -> BranchResult {
        let started = Instant::now();
        let abort = work.abort_handle();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                abort.abort();
                Err("cancelled".to_string())
            }
            result = tokio::time::timeout(deadline, work) => match result {
                Err(_elapsed) => Err("deadline-exceeded".to_string()),
                Ok(Err(join_err)) => Err(format!("branch panicked: {join_err}")),
                Ok(Ok(Err(engine_err))) => Err(engine_err.to_string()),
                Ok(Ok(Ok(hits))) => Ok(hits),
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(hits) => BranchResult {
                tier,
                hits,
                elapsed_ms,
                error: None,
            },
            Err(message) => {
                warn!("{} tier failed after {}ms: {}", tier, elapsed_ms, message);
                BranchResult {
                    tier,
                    hits: Vec::new(),
                    elapsed_ms,
                    error: Some(message),
                }
            }
        }
    }
}

struct BranchResult {
    tier: Tier,
    hits: Vec<SearchHit>,
    elapsed_ms: u64,
    error: Option<String>,
}

/// Symbol-store rows become symbol-level hits with a definition line
fn symbol_to_hit(symbol: Symbol, rank: usize) -> SearchHit {
    SearchHit {
        path: symbol.file_path.clone(),
        // Exact hits sort ahead of scored hits; rank keeps store order
        score: 1_000.0 - rank as f32,
        base_score: 1_000.0 - rank as f32,
        tier: Tier::Exact,
        tier_rank: rank,
        extension: std::path::Path::new(&symbol.file_path)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default(),
        language: symbol.language.clone(),
        last_modified: 0,
        size: 0,
        symbol_count: 1,
        method_count: 0,
        content: None,
        start_line: Some(symbol.start_line),
        symbols: vec![symbol],
    }
}

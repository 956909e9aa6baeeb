// Result shaping
//
// Turns a composite planner result into a response that fits the caller's
// token budget: highlights, progressive disclosure behind detail handles,
// and a summary/full/auto mode switch. The shaper never emits a response
// whose estimated tokens exceed budget * 1.1 (exactly budget under memory
// pressure).

mod detail;
mod highlight;

pub use detail::{encode_handle, handle_generation, DetailCache, DetailSelector};
pub use highlight::{extract_fragments, Fragment, DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_FRAGMENTS};

use crate::search::planner::CompositeResult;
use crate::search::Tier;
use crate::utils::{ProgressiveReducer, TokenEstimator};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// How many hits a summary view shows
const SUMMARY_TOP_K: usize = 10;
/// Snippet budget inside summary hits
const SUMMARY_FRAGMENTS: usize = 1;

/// Requested response mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Summary,
    Full,
    #[default]
    Auto,
}

/// One hit as it appears in a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapedHit {
    pub path: String,
    pub score: f32,
    pub tier: Tier,
    pub language: String,
    pub last_modified: i64,
    pub size: i64,
    pub symbol_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<Fragment>,
}

/// Aggregate statistics attached to summary views
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultStats {
    pub total_hits: usize,
    pub by_language: Vec<(String, usize)>,
    pub by_tier: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapedResponse {
    pub mode: ResponseMode,
    pub auto_switched: bool,
    pub hits: Vec<ShapedHit>,
    pub stats: ResultStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<(String, u64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_handle: Option<u64>,
    pub estimated_tokens: usize,
}

pub struct ResultShaper {
    detail_cache: Arc<DetailCache>,
    estimator: TokenEstimator,
    reducer: ProgressiveReducer,
    default_budget: usize,
    pressure: AtomicBool,
}

impl ResultShaper {
    pub fn new(detail_cache: Arc<DetailCache>, default_budget: usize) -> Self {
        Self {
            detail_cache,
            estimator: TokenEstimator::new(),
            reducer: ProgressiveReducer::new(),
            default_budget,
            pressure: AtomicBool::new(false),
        }
    }

    /// Under memory pressure the shaper forces summary mode and drops the
    /// 10% budget leeway.
    pub fn set_pressure(&self, on: bool) {
        self.pressure.store(on, Ordering::Relaxed);
    }

    pub fn detail_cache(&self) -> &Arc<DetailCache> {
        &self.detail_cache
    }

    /// Shape a composite result to the token budget
    pub fn shape(
        &self,
        composite: CompositeResult,
        token_budget: Option<usize>,
        requested_mode: ResponseMode,
    ) -> ShapedResponse {
        let budget = token_budget.unwrap_or(self.default_budget).max(1);
        let pressure = self.pressure.load(Ordering::Relaxed);
        let hard_cap = if pressure {
            budget
        } else {
            budget + budget / 10
        };

        let stats = build_stats(&composite);
        let full_hits = self.full_hits(&composite);

        let effective_mode = if pressure {
            ResponseMode::Summary
        } else {
            requested_mode
        };

        match effective_mode {
            ResponseMode::Full => {
                // Explicit full: keep per-hit detail, shed hit count to fit
                let fitted = self.reducer.reduce(&full_hits, hard_cap, |subset| {
                    self.estimator.estimate_json(&subset)
                });
                let estimated = self.estimator.estimate_json(&fitted);
                ShapedResponse {
                    mode: ResponseMode::Full,
                    auto_switched: false,
                    hits: fitted,
                    stats,
                    facets: composite.facets.clone(),
                    detail_handle: None,
                    estimated_tokens: estimated,
                }
            }
            ResponseMode::Summary => {
                self.summary_response(composite, stats, hard_cap, requested_mode != ResponseMode::Summary)
            }
            ResponseMode::Auto => {
                let estimated_full = self.estimator.estimate_json(&full_hits);
                if estimated_full <= budget {
                    ShapedResponse {
                        mode: ResponseMode::Full,
                        auto_switched: false,
                        hits: full_hits,
                        stats,
                        facets: composite.facets.clone(),
                        detail_handle: None,
                        estimated_tokens: estimated_full,
                    }
                } else {
                    debug!(
                        "Auto mode switching to summary ({} tokens > {} budget)",
                        estimated_full, budget
                    );
                    self.summary_response(composite, stats, hard_cap, true)
                }
            }
        }
    }

    /// Resolve a slice of a previously shaped result
    pub fn resolve_detail(
        &self,
        handle: u64,
        selector: &DetailSelector,
    ) -> crate::error::EngineResult<Vec<crate::search::SearchHit>> {
        self.detail_cache.resolve(handle, selector)
    }

    fn full_hits(&self, composite: &CompositeResult) -> Vec<ShapedHit> {
        composite
            .hits
            .iter()
            .map(|hit| {
                let fragments = hit
                    .content
                    .as_deref()
                    .map(|content| {
                        extract_fragments(
                            content,
                            &composite.query,
                            DEFAULT_MAX_FRAGMENTS,
                            DEFAULT_FRAGMENT_SIZE,
                        )
                    })
                    .unwrap_or_default();

                ShapedHit {
                    path: hit.path.clone(),
                    score: hit.score,
                    tier: hit.tier,
                    language: hit.language.clone(),
                    last_modified: hit.last_modified,
                    size: hit.size,
                    symbol_count: hit.symbol_count,
                    start_line: hit.start_line,
                    signature: hit
                        .start_line
                        .and_then(|_| hit.symbols.first().map(|s| s.signature.clone())),
                    fragments,
                }
            })
            .collect()
    }

    fn summary_response(
        &self,
        composite: CompositeResult,
        stats: ResultStats,
        hard_cap: usize,
        auto_switched: bool,
    ) -> ShapedResponse {
        let facets = composite.facets.clone();

        let mut top: Vec<ShapedHit> = composite
            .hits
            .iter()
            .take(SUMMARY_TOP_K)
            .map(|hit| {
                let fragments = hit
                    .content
                    .as_deref()
                    .map(|content| {
                        extract_fragments(content, &composite.query, SUMMARY_FRAGMENTS, 60)
                    })
                    .unwrap_or_default();

                ShapedHit {
                    path: hit.path.clone(),
                    score: hit.score,
                    tier: hit.tier,
                    language: hit.language.clone(),
                    last_modified: hit.last_modified,
                    size: hit.size,
                    symbol_count: hit.symbol_count,
                    start_line: hit.start_line,
                    signature: None,
                    fragments,
                }
            })
            .collect();

        top = self.reducer.reduce(&top, hard_cap, |subset| {
            self.estimator.estimate_json(&subset)
        });

        // Park the full composite behind a handle before consuming it
        let handle = self.detail_cache.store(composite, now_s());
        let estimated = self.estimator.estimate_json(&top);

        ShapedResponse {
            mode: ResponseMode::Summary,
            auto_switched,
            hits: top,
            stats,
            facets,
            detail_handle: Some(handle),
            estimated_tokens: estimated,
        }
    }
}

fn build_stats(composite: &CompositeResult) -> ResultStats {
    let mut by_language: std::collections::BTreeMap<String, usize> = Default::default();
    for hit in &composite.hits {
        if !hit.language.is_empty() {
            *by_language.entry(hit.language.clone()).or_default() += 1;
        }
    }

    ResultStats {
        total_hits: composite.hits.len(),
        by_language: by_language.into_iter().collect(),
        by_tier: composite
            .tiers
            .iter()
            .map(|t| (t.tier.to_string(), t.hits))
            .collect(),
    }
}

fn now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

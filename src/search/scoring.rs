// Relevance scoring factors
//
// Scoring is a fixed composition of pure factors applied multiplicatively
// to the term-similarity score. The factor list is built once at startup
// (config can override each factor's weight) and never mutated after.
//
// Composition order matches registration order below; since factors
// multiply, order only affects log readability, not results.

use crate::config::ScoringConfig;
use crate::search::engine::SearchHit;
use crate::search::tokenizers::{split_identifier, tokenize_code};
use std::collections::BTreeSet;
use tracing::debug;

/// Score bounds; factors can never push a document outside this range
const SCORE_MIN: f32 = 1e-6;
const SCORE_MAX: f32 = 1e6;

/// Query-side inputs shared by all factors for one search
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub query_lower: String,
    /// Code-analyzed query terms, lowercased
    pub query_terms: Vec<String>,
    /// Whitespace-split query words with original casing, for heuristics
    /// that care about case shape
    pub raw_words: Vec<String>,
    pub query_contains_test: bool,
    /// Wall clock at plan time, ms since epoch
    pub now_ms: i64,
}

impl ScoringContext {
    pub fn new(query: &str, now_ms: i64) -> Self {
        let query_lower = query.to_lowercase();
        Self {
            query_terms: tokenize_code(query).into_iter().map(|t| t.text).collect(),
            raw_words: query.split_whitespace().map(|w| w.to_string()).collect(),
            query_contains_test: query_lower.contains("test"),
            query_lower,
            now_ms,
        }
    }
}

/// Document-side signals, derived once per hit
#[derive(Debug, Clone)]
pub struct DocSignals {
    pub path_lower: String,
    pub filename_lower: String,
    pub filename_stem_lower: String,
    pub filename_tokens: BTreeSet<String>,
    pub extension: String,
    pub type_names_lower: BTreeSet<String>,
    pub symbol_names_lower: BTreeSet<String>,
    pub implements_lower: BTreeSet<String>,
    pub last_modified_ms: i64,
    pub path_depth: usize,
}

impl DocSignals {
    pub fn from_hit(hit: &SearchHit) -> Self {
        let path_lower = hit.path.to_lowercase();
        let filename = std::path::Path::new(&hit.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename_lower = filename.to_lowercase();
        let filename_stem_lower = std::path::Path::new(&filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut filename_tokens: BTreeSet<String> = BTreeSet::new();
        for token in tokenize_code(&filename) {
            filename_tokens.insert(token.text);
        }

        let mut type_names_lower = BTreeSet::new();
        let mut symbol_names_lower = BTreeSet::new();
        let mut implements_lower = BTreeSet::new();
        for symbol in &hit.symbols {
            symbol_names_lower.insert(symbol.name.to_lowercase());
            if symbol.is_type_definition() {
                type_names_lower.insert(symbol.name.to_lowercase());
                for iface in &symbol.interfaces {
                    implements_lower.insert(iface.to_lowercase());
                }
            }
        }

        Self {
            path_depth: path_lower.matches('/').count(),
            path_lower,
            filename_lower,
            filename_stem_lower,
            filename_tokens,
            extension: hit.extension.clone(),
            type_names_lower,
            symbol_names_lower,
            implements_lower,
            last_modified_ms: hit.last_modified,
        }
    }
}

/// A pure scoring contributor. `apply` returns a multiplier; 1.0 means
/// no opinion on this document.
pub trait ScoringFactor: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32;
}

// ---- factors ----

/// Query equals the filename, a type name, or a symbol name exactly
struct ExactMatchBoost {
    weight: f32,
    filename_extra: f32,
}

impl ScoringFactor for ExactMatchBoost {
    fn name(&self) -> &'static str {
        "exact_match"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        let q = &ctx.query_lower;
        if q.is_empty() {
            return 1.0;
        }
        let filename_match = *q == doc.filename_lower || *q == doc.filename_stem_lower;
        let symbol_match =
            doc.type_names_lower.contains(q) || doc.symbol_names_lower.contains(q);

        if filename_match {
            self.weight + self.filename_extra
        } else if symbol_match {
            self.weight
        } else {
            1.0
        }
    }
}

/// Query names a top-level type definition in this file. The multiplier is
/// deliberately large: definition sites must outrank mention sites.
struct TypeDefinitionBoost {
    weight: f32,
}

impl ScoringFactor for TypeDefinitionBoost {
    fn name(&self) -> &'static str {
        "type_definition"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        // Whole-query match only: "UserService" forces the definition file
        // up, "test UserService" stays a text search
        if !ctx.query_lower.is_empty() && doc.type_names_lower.contains(&ctx.query_lower) {
            return self.weight;
        }
        1.0
    }
}

/// Any query term appears as a token of the filename
struct FilenameRelevance {
    weight: f32,
}

impl ScoringFactor for FilenameRelevance {
    fn name(&self) -> &'static str {
        "filename_relevance"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        if ctx
            .query_terms
            .iter()
            .any(|t| doc.filename_tokens.contains(t))
        {
            self.weight
        } else {
            1.0
        }
    }
}

/// Test-path de-boost, production-directory boost, and depth penalty.
/// The de-boost inverts into an affinity boost when the query itself asks
/// for tests, so "test AuthService" surfaces the test files first.
struct PathRelevance {
    test_penalty: f32,
    test_affinity: f32,
    directory_boost: f32,
    depth_decay: f32,
}

const BOOSTED_DIRS: &[&str] = &["/services/", "/controllers/", "/models/", "/handlers/"];

impl PathRelevance {
    fn is_test_path(path: &str, filename: &str) -> bool {
        path.contains("/test/")
            || path.contains("/tests/")
            || path.contains("__tests__")
            || path.starts_with("test/")
            || path.starts_with("tests/")
            || has_test_suffix(filename)
    }
}

fn has_test_suffix(filename: &str) -> bool {
    let stem = filename.split('.').next().unwrap_or(filename);
    filename
        .split('.')
        .skip(1)
        .any(|part| part == "test" || part == "spec")
        || stem.ends_with("_test")
}

impl ScoringFactor for PathRelevance {
    fn name(&self) -> &'static str {
        "path_relevance"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        let mut multiplier = 1.0;

        if Self::is_test_path(&doc.path_lower, &doc.filename_lower) {
            multiplier *= if ctx.query_contains_test {
                self.test_affinity
            } else {
                self.test_penalty
            };
        }

        if BOOSTED_DIRS.iter().any(|d| doc.path_lower.contains(d)) {
            multiplier *= self.directory_boost;
        }

        if doc.path_depth > 4 {
            multiplier *= self.depth_decay.powi((doc.path_depth - 4) as i32);
        }

        multiplier
    }
}

/// Fresh files get a slight edge: 1 + w * exp(-age_days / 14)
struct Recency {
    weight: f32,
}

impl ScoringFactor for Recency {
    fn name(&self) -> &'static str {
        "recency"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        if doc.last_modified_ms <= 0 {
            return 1.0;
        }
        let age_ms = (ctx.now_ms - doc.last_modified_ms).max(0) as f64;
        let age_days = age_ms / (24.0 * 60.0 * 60.0 * 1000.0);
        1.0 + self.weight * (-age_days / 14.0).exp() as f32
    }
}

/// Source files up, build artifacts down
struct FileTypeRelevance {
    source_boost: f32,
    artifact_penalty: f32,
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "ts", "tsx", "js", "jsx", "go", "java", "kt", "cs", "c", "h", "cpp", "hpp",
    "rb", "php", "swift",
];

impl ScoringFactor for FileTypeRelevance {
    fn name(&self) -> &'static str {
        "file_type"
    }

    fn apply(&self, doc: &DocSignals, _ctx: &ScoringContext) -> f32 {
        let filename = &doc.filename_lower;
        let generated = filename.contains(".min.")
            || filename.ends_with(".map")
            || filename.ends_with(".lock")
            || filename.contains(".generated.");
        if generated {
            return self.artifact_penalty;
        }
        if SOURCE_EXTENSIONS.contains(&doc.extension.as_str()) {
            return self.source_boost;
        }
        1.0
    }
}

/// Query looks like an interface name and this file implements it
struct InterfaceImplementation {
    weight: f32,
}

fn looks_like_interface_name(term: &str) -> bool {
    let mut chars = term.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('I'), Some(second)) if second.is_uppercase()
    )
}

impl ScoringFactor for InterfaceImplementation {
    fn name(&self) -> &'static str {
        "interface_implementation"
    }

    fn apply(&self, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        let implemented = ctx
            .query_terms
            .iter()
            .any(|t| doc.implements_lower.contains(t));

        if implemented && ctx.raw_words.iter().any(|w| looks_like_interface_name(w)) {
            self.weight
        } else {
            1.0
        }
    }
}

// ---- pipeline ----

pub struct ScorePipeline {
    factors: Vec<Box<dyn ScoringFactor>>,
}

impl ScorePipeline {
    /// Build the static factor list, applying `scoring.factors.*` weight
    /// overrides from config. Adding a factor means adding one entry here.
    pub fn from_config(config: &ScoringConfig) -> Self {
        let weight = |name: &str, default: f32| -> f32 {
            config.factors.get(name).copied().unwrap_or(default)
        };

        let factors: Vec<Box<dyn ScoringFactor>> = vec![
            Box::new(ExactMatchBoost {
                weight: weight("exact_match", 1.3),
                filename_extra: 0.3,
            }),
            Box::new(TypeDefinitionBoost {
                weight: weight("type_definition", 10.0),
            }),
            Box::new(FilenameRelevance {
                weight: weight("filename_relevance", 1.5),
            }),
            Box::new(PathRelevance {
                test_penalty: weight("path_relevance_test_penalty", 0.15),
                test_affinity: weight("path_relevance_test_affinity", 4.0),
                directory_boost: weight("path_relevance_directory_boost", 1.2),
                depth_decay: weight("path_relevance_depth_decay", 0.98),
            }),
            Box::new(Recency {
                weight: weight("recency", 0.5),
            }),
            Box::new(FileTypeRelevance {
                source_boost: weight("file_type_source_boost", 1.1),
                artifact_penalty: weight("file_type_artifact_penalty", 0.6),
            }),
            Box::new(InterfaceImplementation {
                weight: weight("interface_implementation", 1.2),
            }),
        ];

        Self { factors }
    }

    /// Final score for one document: base term score times every factor,
    /// clamped to a finite positive range.
    pub fn score(&self, base: f32, doc: &DocSignals, ctx: &ScoringContext) -> f32 {
        let mut score = base.max(SCORE_MIN);
        for factor in &self.factors {
            let multiplier = factor.apply(doc, ctx);
            if (multiplier - 1.0).abs() > f32::EPSILON {
                debug!(
                    "factor {} x{:.3} on {}",
                    factor.name(),
                    multiplier,
                    doc.path_lower
                );
            }
            score *= multiplier;
        }
        score.clamp(SCORE_MIN, SCORE_MAX)
    }

    /// Score a batch of hits in place and re-sort by final score
    pub fn apply(&self, hits: &mut [SearchHit], ctx: &ScoringContext) {
        for hit in hits.iter_mut() {
            let signals = DocSignals::from_hit(hit);
            hit.score = self.score(hit.base_score, &signals, ctx);
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
    }

    pub fn factor_names(&self) -> Vec<&'static str> {
        self.factors.iter().map(|f| f.name()).collect()
    }
}

/// Expand a query term the way filenames are tokenized, for tests and the
/// shaper's highlight matching
pub fn term_tokens(term: &str) -> Vec<String> {
    split_identifier(term)
        .into_iter()
        .map(|(_, part)| part.to_lowercase())
        .collect()
}

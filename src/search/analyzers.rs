// Analyzer registration and synonyms
//
// Two analyzers exist: "code" for source text fields (no stemming) and
// "text" for human prose (stop words + stemming). Synonym expansion uses a
// small versioned domain dictionary and happens at query build time against
// the same map, so two engines with the same synonym version analyze
// identically.

use crate::search::tokenizers::CodeTokenizer;
use std::collections::HashMap;
use tantivy::tokenizer::{
    Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer,
};
use tantivy::Index;

/// Analyzer name for source code fields
pub const CODE_ANALYZER: &str = "code";
/// Analyzer name for human text fields
pub const TEXT_ANALYZER: &str = "text";

/// Version of the synonym dictionary; part of query cache keys
pub const SYNONYM_MAP_VERSION: u32 = 1;

/// Exact bidirectional pairs; small on purpose. Expansion at query time
/// keeps postings lean and keeps the analyzer a pure function of its input.
const SYNONYM_PAIRS: &[(&str, &str)] = &[
    ("auth", "authentication"),
    ("config", "configuration"),
    ("init", "initialize"),
    ("db", "database"),
    ("repo", "repository"),
    ("util", "utility"),
    ("impl", "implementation"),
    ("func", "function"),
    ("dir", "directory"),
    ("msg", "message"),
    ("err", "error"),
    ("param", "parameter"),
];

/// Register both analyzers on a freshly opened index. Must run before any
/// write or query uses the custom tokenizer names.
pub fn register_analyzers(index: &Index) {
    let manager = index.tokenizers();

    manager.register(
        CODE_ANALYZER,
        TextAnalyzer::builder(CodeTokenizer).build(),
    );

    manager.register(
        TEXT_ANALYZER,
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(
                STOP_WORDS.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            ))
            .filter(Stemmer::new(Language::English))
            .build(),
    );
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Versioned synonym dictionary
#[derive(Debug, Clone)]
pub struct SynonymMap {
    version: u32,
    entries: HashMap<String, Vec<String>>,
    enabled: bool,
}

impl SynonymMap {
    pub fn new(enabled: bool) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for (a, b) in SYNONYM_PAIRS {
            entries
                .entry(a.to_string())
                .or_default()
                .push(b.to_string());
            entries
                .entry(b.to_string())
                .or_default()
                .push(a.to_string());
        }
        Self {
            version: SYNONYM_MAP_VERSION,
            entries,
            enabled,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Synonyms of a term, excluding the term itself. Empty when expansion
    /// is disabled.
    pub fn expand(&self, term: &str) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        self.entries
            .get(&term.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// A query string plus every synonym-expanded variant of its terms
    pub fn expand_query(&self, query: &str) -> Vec<String> {
        if !self.enabled {
            return vec![query.to_string()];
        }

        let mut variants = vec![query.to_string()];
        for word in query.split_whitespace() {
            for synonym in self.expand(word) {
                let replaced = query
                    .split_whitespace()
                    .map(|w| if w == word { synonym.as_str() } else { w })
                    .collect::<Vec<_>>()
                    .join(" ");
                if !variants.contains(&replaced) {
                    variants.push(replaced);
                }
            }
        }
        variants
    }
}

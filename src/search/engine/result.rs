// Search hit types

use crate::extractors::Symbol;
use serde::{Deserialize, Serialize};

/// Which parallel backend produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Exact lookup against the symbol store
    Exact,
    /// Relevance-scored inverted-index search
    Scored,
    /// Literal phrase search for syntax-heavy queries
    Literal,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Scored => write!(f, "scored"),
            Self::Literal => write!(f, "literal"),
        }
    }
}

/// One file-level hit from the inverted index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    /// Final score after the factor pipeline
    pub score: f32,
    /// Raw term-similarity score before factors
    pub base_score: f32,
    pub tier: Tier,
    /// Rank within its tier before merging
    pub tier_rank: usize,
    pub extension: String,
    pub language: String,
    pub last_modified: i64,
    pub size: i64,
    pub symbol_count: u64,
    pub method_count: u64,
    /// Stored file content, present unless the response was slimmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Symbols extracted from this file at commit time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<Symbol>,
    /// For symbol-level hits: the definition line this hit points at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
}

impl SearchHit {
    /// Dedup key: file hits collapse by path, symbol hits by (path, line)
    pub fn dedup_key(&self) -> (String, Option<u32>) {
        (self.path.clone(), self.start_line)
    }
}

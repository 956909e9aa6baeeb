// Query execution
//
// Every function here takes a Snapshot so all branches of one planner run
// see the same committed state. Queries with syntax that confuses the
// parser degrade to the literal phrase path instead of erroring.

use super::result::{SearchHit, Tier};
use super::{SearchIndex, Snapshot};
use crate::error::EngineResult;
use crate::extractors::Symbol;
use std::ops::Bound;
use tantivy::collector::{Count, FacetCollector, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, FuzzyTermQuery, MoreLikeThisQuery, Occur, PhraseQuery, Query,
    QueryParser, RegexQuery, RangeQuery, TermQuery,
};
use tantivy::schema::{Facet, IndexRecordOption, Value};
use tantivy::{DocAddress, TantivyDocument, Term};
use tracing::{debug, trace};

/// How text_search interprets the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Standard,
    Wildcard,
    Fuzzy,
    Phrase,
    Regex,
}

/// Low-cost filters applied inside the index query
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub extensions: Vec<String>,
    pub language: Option<String>,
    /// Glob over the stored path, applied after retrieval
    pub path_glob: Option<String>,
    pub modified_after: Option<i64>,
    pub modified_before: Option<i64>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
            && self.language.is_none()
            && self.path_glob.is_none()
            && self.modified_after.is_none()
            && self.modified_before.is_none()
            && self.min_size.is_none()
            && self.max_size.is_none()
    }
}

/// Facet counts keyed by symbol kind
#[derive(Debug, Clone, Default)]
pub struct KindFacets {
    pub counts: Vec<(String, u64)>,
}

/// A query with no tokens matches nothing, not everything
fn match_nothing() -> Box<dyn Query> {
    Box::new(BooleanQuery::new(Vec::new()))
}

impl SearchIndex {
    /// Relevance-scored search over the boosted field set
    pub fn search_scored(
        &self,
        snapshot: &Snapshot,
        query_text: &str,
        mode: QueryMode,
        filters: &SearchFilters,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let query = self.build_query(query_text, mode)?;
        self.execute(snapshot, query, filters, limit, Tier::Scored)
    }

    /// Literal tier: the raw query is analyzed with the code tokenizer and
    /// matched as an exact phrase in `content`. Handles `Vec<String>`,
    /// `foo::bar`, and other syntax the query parser rejects.
    pub fn literal_search(
        &self,
        snapshot: &Snapshot,
        raw: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let Some(query) = self.literal_query(raw) else {
            return Ok(Vec::new());
        };
        self.execute(snapshot, query, filters, limit, Tier::Literal)
    }

    /// Document-vector similarity over a seed path
    pub fn more_like_this(
        &self,
        snapshot: &Snapshot,
        seed_path: &str,
        min_term_frequency: usize,
        max_query_terms: usize,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let Some(seed) = self.address_of(snapshot, seed_path)? else {
            return Ok(Vec::new());
        };

        let query = MoreLikeThisQuery::builder()
            .with_min_doc_frequency(1)
            .with_min_term_frequency(min_term_frequency)
            .with_max_query_terms(max_query_terms)
            .with_min_word_length(2)
            .with_boost_factor(1.0)
            .with_document(seed);

        let mut hits = self.execute(
            snapshot,
            Box::new(query),
            &SearchFilters::default(),
            limit + 1,
            Tier::Scored,
        )?;
        // The seed file always matches itself best; drop it
        hits.retain(|h| h.path != seed_path);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Fuzzy search over filename terms, for typo-tolerant file lookup
    pub fn fuzzy_filename_search(
        &self,
        snapshot: &Snapshot,
        name: &str,
        distance: u8,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let cleaned = name.trim_end_matches('~').to_lowercase();
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let term = Term::from_field_text(self.schema.fields.filename, &cleaned);
        let query = FuzzyTermQuery::new(term, distance, true);
        self.execute(
            snapshot,
            Box::new(query),
            &SearchFilters::default(),
            limit,
            Tier::Scored,
        )
    }

    /// Files modified in [since_ms, now], newest first
    pub fn recent_files_search(
        &self,
        snapshot: &Snapshot,
        since_ms: i64,
        filters: &SearchFilters,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let range = RangeQuery::new(
            Bound::Included(Term::from_field_i64(
                self.schema.fields.last_modified_dv,
                since_ms,
            )),
            Bound::Unbounded,
        );

        let mut hits = self.execute(snapshot, Box::new(range), filters, limit.max(64), Tier::Scored)?;
        hits.sort_by_key(|h| std::cmp::Reverse(h.last_modified));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Files within a size window, largest first
    pub fn size_range_search(
        &self,
        snapshot: &Snapshot,
        min_size: Option<i64>,
        max_size: Option<i64>,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let lower = match min_size {
            Some(v) => Bound::Included(Term::from_field_i64(self.schema.fields.size_dv, v)),
            None => Bound::Unbounded,
        };
        let upper = match max_size {
            Some(v) => Bound::Included(Term::from_field_i64(self.schema.fields.size_dv, v)),
            None => Bound::Unbounded,
        };

        let query: Box<dyn Query> = match (min_size, max_size) {
            (None, None) => Box::new(AllQuery),
            _ => Box::new(RangeQuery::new(lower, upper)),
        };

        let mut hits = self.execute(
            snapshot,
            query,
            &SearchFilters::default(),
            limit.max(256),
            Tier::Scored,
        )?;
        hits.sort_by_key(|h| std::cmp::Reverse(h.size));
        hits.truncate(limit);
        Ok(hits)
    }

    /// All files under a directory-ish query, matched on path segments
    pub fn directory_search(
        &self,
        snapshot: &Snapshot,
        directory: &str,
        limit: usize,
    ) -> EngineResult<Vec<SearchHit>> {
        let tokens = crate::search::tokenizers::tokenize_code(directory);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let term = Term::from_field_text(self.schema.fields.path_tokens, &t.text);
                (
                    Occur::Must,
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                )
            })
            .collect();

        self.execute(
            snapshot,
            Box::new(BooleanQuery::new(clauses)),
            &SearchFilters::default(),
            limit,
            Tier::Scored,
        )
    }

    /// Symbol-kind facet counts for the documents matching `query_text`
    /// (all documents when empty)
    pub fn kind_facets(&self, snapshot: &Snapshot, query_text: &str) -> EngineResult<KindFacets> {
        let query: Box<dyn Query> = if query_text.trim().is_empty() {
            Box::new(AllQuery)
        } else {
            self.build_query(query_text, QueryMode::Standard)?
        };

        let mut collector = FacetCollector::for_field("kind_facet");
        collector.add_facet(Facet::from("/kind"));

        let counts = snapshot.searcher.search(&query, &collector)?;
        let mut out = Vec::new();
        for (facet, count) in counts.get("/kind") {
            let label = facet
                .to_path_string()
                .trim_start_matches("/kind/")
                .to_string();
            out.push((label, count));
        }
        out.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(KindFacets { counts: out })
    }

    /// Count matching documents without retrieving them
    pub fn count(&self, snapshot: &Snapshot, query_text: &str) -> EngineResult<usize> {
        let query = self.build_query(query_text, QueryMode::Standard)?;
        Ok(snapshot.searcher.search(&query, &Count)?)
    }

    /// Stored document for a path, if indexed
    pub fn hit_by_path(&self, snapshot: &Snapshot, path: &str) -> EngineResult<Option<SearchHit>> {
        match self.address_of(snapshot, path)? {
            Some(addr) => Ok(Some(self.doc_to_hit(snapshot, addr, 0.0, Tier::Exact, 0)?)),
            None => Ok(None),
        }
    }

    /// Stored content hash for a path; reconciliation reads this
    pub fn stored_hash(&self, snapshot: &Snapshot, path: &str) -> EngineResult<Option<String>> {
        let Some(addr) = self.address_of(snapshot, path)? else {
            return Ok(None);
        };
        let doc: TantivyDocument = snapshot.searcher.doc(addr)?;
        Ok(doc
            .get_first(self.schema.fields.content_hash)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    /// Every path currently in the snapshot, for reconciliation diffs
    pub fn all_paths(&self, snapshot: &Snapshot) -> EngineResult<Vec<String>> {
        let top = snapshot
            .searcher
            .search(&AllQuery, &TopDocs::with_limit(1_000_000))?;
        let mut paths = Vec::with_capacity(top.len());
        for (_score, addr) in top {
            let doc: TantivyDocument = snapshot.searcher.doc(addr)?;
            if let Some(path) = doc.get_first(self.schema.fields.path).and_then(|v| v.as_str()) {
                paths.push(path.to_string());
            }
        }
        Ok(paths)
    }

    // ---- internals ----

    fn build_query(&self, query_text: &str, mode: QueryMode) -> EngineResult<Box<dyn Query>> {
        match mode {
            QueryMode::Standard => Ok(self.standard_query(query_text)),
            QueryMode::Phrase => Ok(self
                .literal_query(query_text)
                .unwrap_or_else(match_nothing)),
            QueryMode::Wildcard => self.wildcard_query(query_text),
            QueryMode::Fuzzy => Ok(self.fuzzy_query(query_text)),
            QueryMode::Regex => {
                let query = RegexQuery::from_pattern(query_text, self.schema.fields.content)
                    .map_err(|e| crate::error::EngineError::Validation {
                        reason: format!("invalid regex '{query_text}': {e}"),
                    })?;
                Ok(Box::new(query))
            }
        }
    }

    /// Parser-based query over the boosted fields, degrading to the literal
    /// phrase form when the parser rejects the syntax
    fn standard_query(&self, query_text: &str) -> Box<dyn Query> {
        let fields: Vec<_> = self
            .schema
            .boosted_search_fields()
            .iter()
            .map(|(f, _)| *f)
            .collect();
        let mut parser = QueryParser::for_index(&self.index, fields);
        for (field, boost) in self.schema.boosted_search_fields() {
            parser.set_field_boost(field, boost);
        }

        match parser.parse_query(query_text) {
            Ok(query) => query,
            Err(e) => {
                trace!("Query parser rejected '{}' ({}); using literal form", query_text, e);
                self.literal_query(query_text)
                    .unwrap_or_else(match_nothing)
            }
        }
    }

    /// Code-analyzed phrase over `content`; single tokens become term queries
    fn literal_query(&self, raw: &str) -> Option<Box<dyn Query>> {
        let tokens = crate::search::tokenizers::tokenize_code(raw);
        if tokens.is_empty() {
            return None;
        }

        // Keep one token per position (the original form) so the phrase
        // positions line up with how documents were indexed.
        let mut per_position: Vec<Term> = Vec::new();
        let mut last_position = usize::MAX;
        for token in &tokens {
            if token.position != last_position {
                per_position.push(Term::from_field_text(
                    self.schema.fields.content,
                    &token.text,
                ));
                last_position = token.position;
            }
        }

        if per_position.len() == 1 {
            let term = per_position.into_iter().next().expect("one term");
            Some(Box::new(TermQuery::new(
                term,
                IndexRecordOption::WithFreqsAndPositions,
            )))
        } else {
            Some(Box::new(PhraseQuery::new(per_position)))
        }
    }

    /// `*` and `?` wildcards compiled to a term regex on `all`
    fn wildcard_query(&self, pattern: &str) -> EngineResult<Box<dyn Query>> {
        let mut regex = String::with_capacity(pattern.len() * 2);
        for c in pattern.to_lowercase().chars() {
            match c {
                '*' => regex.push_str(".*"),
                '?' => regex.push('.'),
                c if c.is_alphanumeric() || c == '_' => regex.push(c),
                _ => regex.push_str(&format!("\\{c}")),
            }
        }
        let query = RegexQuery::from_pattern(&regex, self.schema.fields.all).map_err(|e| {
            crate::error::EngineError::Validation {
                reason: format!("invalid wildcard pattern '{pattern}': {e}"),
            }
        })?;
        Ok(Box::new(query))
    }

    /// Per-token fuzzy match over `all`, distance scaled to token length
    fn fuzzy_query(&self, query_text: &str) -> Box<dyn Query> {
        let tokens = crate::search::tokenizers::tokenize_code(query_text);
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let distance = if t.text.chars().count() > 6 { 2 } else { 1 };
                let term = Term::from_field_text(self.schema.fields.all, &t.text);
                (
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, distance, true)) as Box<dyn Query>,
                )
            })
            .collect();
        if clauses.is_empty() {
            match_nothing()
        } else {
            Box::new(BooleanQuery::new(clauses))
        }
    }

    fn filter_clauses(&self, filters: &SearchFilters) -> Vec<(Occur, Box<dyn Query>)> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if !filters.extensions.is_empty() {
            let ext_clauses: Vec<(Occur, Box<dyn Query>)> = filters
                .extensions
                .iter()
                .map(|ext| {
                    let term = Term::from_field_text(
                        self.schema.fields.extension,
                        ext.trim_start_matches('.').to_lowercase().as_str(),
                    );
                    (
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                    )
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(ext_clauses))));
        }

        if let Some(language) = &filters.language {
            let term = Term::from_field_text(self.schema.fields.language_dv, language);
            clauses.push((
                Occur::Must,
                Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
            ));
        }

        if filters.modified_after.is_some() || filters.modified_before.is_some() {
            let lower = filters
                .modified_after
                .map(|v| Bound::Included(Term::from_field_i64(self.schema.fields.last_modified_dv, v)))
                .unwrap_or(Bound::Unbounded);
            let upper = filters
                .modified_before
                .map(|v| Bound::Included(Term::from_field_i64(self.schema.fields.last_modified_dv, v)))
                .unwrap_or(Bound::Unbounded);
            clauses.push((Occur::Must, Box::new(RangeQuery::new(lower, upper))));
        }

        if filters.min_size.is_some() || filters.max_size.is_some() {
            let lower = filters
                .min_size
                .map(|v| Bound::Included(Term::from_field_i64(self.schema.fields.size_dv, v)))
                .unwrap_or(Bound::Unbounded);
            let upper = filters
                .max_size
                .map(|v| Bound::Included(Term::from_field_i64(self.schema.fields.size_dv, v)))
                .unwrap_or(Bound::Unbounded);
            clauses.push((Occur::Must, Box::new(RangeQuery::new(lower, upper))));
        }

        clauses
    }

    fn execute(
        &self,
        snapshot: &Snapshot,
        query: Box<dyn Query>,
        filters: &SearchFilters,
        limit: usize,
        tier: Tier,
    ) -> EngineResult<Vec<SearchHit>> {
        let mut clauses = self.filter_clauses(filters);
        let query: Box<dyn Query> = if clauses.is_empty() {
            query
        } else {
            clauses.insert(0, (Occur::Must, query));
            Box::new(BooleanQuery::new(clauses))
        };

        let glob = match &filters.path_glob {
            Some(pattern) => Some(
                glob::Pattern::new(pattern).map_err(|e| crate::error::EngineError::Validation {
                    reason: format!("invalid path glob '{pattern}': {e}"),
                })?,
            ),
            None => None,
        };

        let top = snapshot
            .searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)))?;
        debug!("Query returned {} raw hits (tier {})", top.len(), tier);

        let mut hits = Vec::with_capacity(top.len());
        for (rank, (score, addr)) in top.into_iter().enumerate() {
            let hit = self.doc_to_hit(snapshot, addr, score, tier, rank)?;
            if let Some(glob) = &glob {
                if !glob.matches(&hit.path) {
                    continue;
                }
            }
            hits.push(hit);
        }
        Ok(hits)
    }

    fn address_of(&self, snapshot: &Snapshot, path: &str) -> EngineResult<Option<DocAddress>> {
        let term = Term::from_field_text(self.schema.fields.path, path);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = snapshot.searcher.search(&query, &TopDocs::with_limit(1))?;
        Ok(top.into_iter().next().map(|(_score, addr)| addr))
    }

    fn doc_to_hit(
        &self,
        snapshot: &Snapshot,
        addr: DocAddress,
        score: f32,
        tier: Tier,
        tier_rank: usize,
    ) -> EngineResult<SearchHit> {
        let f = &self.schema.fields;
        let doc: TantivyDocument = snapshot.searcher.doc(addr)?;

        let get_str = |field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };

        let symbols: Vec<Symbol> = doc
            .get_first(f.type_info_json)
            .and_then(|v| v.as_str())
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();

        Ok(SearchHit {
            path: get_str(f.path),
            score,
            base_score: score,
            tier,
            tier_rank,
            extension: get_str(f.extension),
            language: doc
                .get_first(f.language_dv)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            last_modified: doc
                .get_first(f.last_modified_dv)
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            size: doc.get_first(f.size_dv).and_then(|v| v.as_i64()).unwrap_or(0),
            symbol_count: doc
                .get_first(f.symbol_count)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            method_count: doc
                .get_first(f.method_count)
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            content: {
                let content = get_str(f.content);
                if content.is_empty() {
                    None
                } else {
                    Some(content)
                }
            },
            symbols,
            start_line: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::schema::FileDocument;

    fn index_with(docs: Vec<FileDocument>) -> SearchIndex {
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();
        for doc in &docs {
            writer.add_or_replace(doc).unwrap();
        }
        writer.commit().unwrap();
        index.refresh().unwrap();
        index
    }

    fn doc(path: &str, content: &str, modified: i64, size: i64) -> FileDocument {
        FileDocument {
            path: path.to_string(),
            language: if path.ends_with(".rs") { "rust" } else { "typescript" }.to_string(),
            content: content.to_string(),
            content_hash: crate::extractors::content_hash(content.as_bytes()),
            size,
            last_modified: modified,
            symbols: Vec::new(),
        }
    }

    #[test]
    fn test_standard_search_finds_identifiers() {
        let index = index_with(vec![
            doc("src/user.rs", "fn createUserSession() {}", 100, 30),
            doc("src/other.rs", "fn unrelated() {}", 100, 20),
        ]);
        let snapshot = index.snapshot();

        let hits = index
            .search_scored(&snapshot, "session", QueryMode::Standard, &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/user.rs");
    }

    #[test]
    fn test_syntax_heavy_query_does_not_crash() {
        let index = index_with(vec![doc(
            "src/vec.rs",
            "fn collect() -> Vec<String> { Vec::new() }",
            100,
            50,
        )]);
        let snapshot = index.snapshot();

        for query in ["Vec<String>", "Vec::new", "a[0]", "x: &mut T", "::"] {
            let result = index.search_scored(
                &snapshot,
                query,
                QueryMode::Standard,
                &SearchFilters::default(),
                10,
            );
            assert!(result.is_ok(), "query '{query}' errored");
        }

        let hits = index
            .literal_search(&snapshot, "Vec<String>", &SearchFilters::default(), 10)
            .unwrap();
        assert_eq!(hits.len(), 1, "literal tier finds the generic type");
    }

    #[test]
    fn test_extension_filter() {
        let index = index_with(vec![
            doc("a.rs", "shared token alpha", 100, 10),
            doc("b.ts", "shared token alpha", 100, 10),
        ]);
        let snapshot = index.snapshot();

        let filters = SearchFilters {
            extensions: vec!["rs".to_string()],
            ..Default::default()
        };
        let hits = index
            .search_scored(&snapshot, "alpha", QueryMode::Standard, &filters, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.rs");
    }

    #[test]
    fn test_path_glob_filter() {
        let index = index_with(vec![
            doc("src/core/a.rs", "needle", 100, 10),
            doc("tests/b.rs", "needle", 100, 10),
        ]);
        let snapshot = index.snapshot();

        let filters = SearchFilters {
            path_glob: Some("src/**".to_string()),
            ..Default::default()
        };
        let hits = index
            .search_scored(&snapshot, "needle", QueryMode::Standard, &filters, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].path.starts_with("src/"));
    }

    #[test]
    fn test_recent_files_ordering() {
        let index = index_with(vec![
            doc("old.rs", "x", 1_000, 10),
            doc("newest.rs", "x", 9_000, 10),
            doc("middle.rs", "x", 5_000, 10),
        ]);
        let snapshot = index.snapshot();

        let hits = index
            .recent_files_search(&snapshot, 2_000, &SearchFilters::default(), 10)
            .unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["newest.rs", "middle.rs"]);
    }

    #[test]
    fn test_size_range_search() {
        let index = index_with(vec![
            doc("small.rs", "x", 100, 10),
            doc("large.rs", "x", 100, 10_000),
            doc("medium.rs", "x", 100, 500),
        ]);
        let snapshot = index.snapshot();

        let hits = index
            .size_range_search(&snapshot, Some(100), None, 10)
            .unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["large.rs", "medium.rs"]);
    }

    #[test]
    fn test_fuzzy_filename() {
        let index = index_with(vec![
            doc("src/UserService.ts", "class UserService {}", 100, 10),
            doc("src/billing.ts", "export const x = 1", 100, 10),
        ]);
        let snapshot = index.snapshot();

        let hits = index
            .fuzzy_filename_search(&snapshot, "UserServce~", 2, 10)
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].path, "src/UserService.ts");
    }

    #[test]
    fn test_more_like_this_excludes_seed() {
        let shared = "session token refresh expiry login logout credential";
        let index = index_with(vec![
            doc("auth/a.rs", shared, 100, 10),
            doc("auth/b.rs", &format!("{shared} extras"), 100, 10),
            doc("math/c.rs", "integral derivative matrix", 100, 10),
        ]);
        let snapshot = index.snapshot();

        let hits = index
            .more_like_this(&snapshot, "auth/a.rs", 1, 25, 5)
            .unwrap();
        assert!(hits.iter().all(|h| h.path != "auth/a.rs"));
        assert_eq!(hits.first().map(|h| h.path.as_str()), Some("auth/b.rs"));
    }

    #[test]
    fn test_directory_search() {
        let index = index_with(vec![
            doc("src/services/auth.rs", "a", 100, 10),
            doc("src/models/user.rs", "b", 100, 10),
        ]);
        let snapshot = index.snapshot();

        let hits = index.directory_search(&snapshot, "services", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "src/services/auth.rs");
    }

    #[test]
    fn test_query_determinism_on_fixed_snapshot() {
        let index = index_with(vec![
            doc("a.rs", "alpha beta gamma", 100, 10),
            doc("b.rs", "alpha beta", 200, 20),
            doc("c.rs", "alpha", 300, 30),
        ]);
        let snapshot = index.snapshot();

        let run = || {
            index
                .search_scored(&snapshot, "alpha beta", QueryMode::Standard, &SearchFilters::default(), 10)
                .unwrap()
                .into_iter()
                .map(|h| (h.path, h.score.to_bits()))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}

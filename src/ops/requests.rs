// Typed operation requests
//
// Every operation has a typed request struct deserialized from the caller's
// JSON. Validation is declarative-ish: each struct checks itself at call
// time and rejects with a validation error, never a panic.

use crate::error::{EngineError, EngineResult};
use crate::extractors::SymbolKind;
use crate::search::QueryMode;
use crate::shaper::ResponseMode;
use serde::{Deserialize, Serialize};

fn default_max_results() -> usize {
    50
}

/// text_search `search_type` option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Standard,
    Wildcard,
    Fuzzy,
    Phrase,
    Regex,
}

impl From<SearchType> for QueryMode {
    fn from(value: SearchType) -> Self {
        match value {
            SearchType::Standard => QueryMode::Standard,
            SearchType::Wildcard => QueryMode::Wildcard,
            SearchType::Fuzzy => QueryMode::Fuzzy,
            SearchType::Phrase => QueryMode::Phrase,
            SearchType::Regex => QueryMode::Regex,
        }
    }
}

/// recent_files window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFrame {
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "4h")]
    FourHours,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "4w")]
    FourWeeks,
}

impl TimeFrame {
    pub fn as_millis(&self) -> i64 {
        const MINUTE: i64 = 60 * 1_000;
        match self {
            Self::ThirtyMinutes => 30 * MINUTE,
            Self::FourHours => 4 * 60 * MINUTE,
            Self::TwentyFourHours => 24 * 60 * MINUTE,
            Self::SevenDays => 7 * 24 * 60 * MINUTE,
            Self::FourWeeks => 28 * 24 * 60 * MINUTE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexWorkspaceRequest {
    #[serde(default)]
    pub force_rebuild: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSearchRequest {
    pub query: String,
    #[serde(default)]
    pub search_type: SearchType,
    /// Accepted for compatibility; the code analyzer is case-folding, so
    /// matching is case-insensitive regardless
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Accepted for compatibility; fragments are line-scoped windows, so
    /// surrounding lines are not duplicated into the response
    #[serde(default)]
    pub context_lines: Option<usize>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub response_mode: ResponseMode,
    #[serde(default)]
    pub token_budget: Option<usize>,
}

impl TextSearchRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.query.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "query must not be empty".into(),
            });
        }
        if self.max_results == 0 || self.max_results > 1_000 {
            return Err(EngineError::Validation {
                reason: "max_results must be between 1 and 1000".into(),
            });
        }
        if self.search_type == SearchType::Regex {
            regex::Regex::new(&self.query).map_err(|e| EngineError::Validation {
                reason: format!("invalid regex query: {e}"),
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSearchRequest {
    pub query: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_max_results")]
    pub limit: usize,
}

impl SymbolSearchRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.query.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "query must not be empty".into(),
            });
        }
        if let Some(kind) = &self.kind {
            if SymbolKind::parse(kind) == SymbolKind::Other && kind != "other" {
                return Err(EngineError::Validation {
                    reason: format!("unknown symbol kind '{kind}'"),
                });
            }
        }
        Ok(())
    }

    pub fn kind_filter(&self) -> Option<SymbolKind> {
        self.kind.as_deref().map(SymbolKind::parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSearchRequest {
    pub query: String,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl FileSearchRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.query.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "query must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFilesRequest {
    #[serde(default)]
    pub time_frame: TimeFrame,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarFilesRequest {
    pub seed_path: String,
    #[serde(default = "default_min_term_frequency")]
    pub min_term_frequency: usize,
    #[serde(default = "default_max_query_terms")]
    pub max_query_terms: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_min_term_frequency() -> usize {
    2
}
fn default_max_query_terms() -> usize {
    25
}

impl SimilarFilesRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.seed_path.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "seed_path must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySearchRequest {
    pub directory: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSizeAnalysisRequest {
    #[serde(default)]
    pub min_size: Option<i64>,
    #[serde(default)]
    pub max_size: Option<i64>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl FileSizeAnalysisRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(EngineError::Validation {
                    reason: format!("min_size {min} exceeds max_size {max}"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotoDefinitionRequest {
    /// Symbol name or qualified name ("auth::SessionManager")
    pub symbol: String,
}

impl GotoDefinitionRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::Validation {
                reason: "symbol must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindReferencesRequest {
    /// Symbol id (preferred) or name
    #[serde(default)]
    pub symbol_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_reference_depth")]
    pub max_depth: u32,
}

fn default_reference_depth() -> u32 {
    1
}

impl FindReferencesRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.symbol_id.is_none() && self.name.is_none() {
            return Err(EngineError::Validation {
                reason: "either symbol_id or name is required".into(),
            });
        }
        if self.max_depth == 0 || self.max_depth > 10 {
            return Err(EngineError::Validation {
                reason: "max_depth must be between 1 and 10".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDetailRequest {
    pub handle: u64,
    #[serde(default)]
    pub range: Option<(usize, usize)>,
    #[serde(default)]
    pub path: Option<String>,
}

impl ResolveDetailRequest {
    pub fn selector(&self) -> crate::shaper::DetailSelector {
        if let Some((start, end)) = self.range {
            crate::shaper::DetailSelector::Range { start, end }
        } else if let Some(path) = &self.path {
            crate::shaper::DetailSelector::Path(path.clone())
        } else {
            crate::shaper::DetailSelector::All
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_search_validation() {
        let mut request = TextSearchRequest {
            query: "session".into(),
            search_type: SearchType::Standard,
            case_sensitive: false,
            file_pattern: None,
            extensions: vec![],
            context_lines: None,
            max_results: 50,
            response_mode: ResponseMode::Auto,
            token_budget: None,
        };
        assert!(request.validate().is_ok());

        request.query = "  ".into();
        assert_eq!(request.validate().unwrap_err().code(), "validation-error");

        request.query = "ok".into();
        request.max_results = 0;
        assert_eq!(request.validate().unwrap_err().code(), "validation-error");
    }

    #[test]
    fn test_regex_query_checked_up_front() {
        let request = TextSearchRequest {
            query: "[unclosed".into(),
            search_type: SearchType::Regex,
            case_sensitive: false,
            file_pattern: None,
            extensions: vec![],
            context_lines: None,
            max_results: 10,
            response_mode: ResponseMode::Auto,
            token_budget: None,
        };
        assert_eq!(request.validate().unwrap_err().code(), "validation-error");
    }

    #[test]
    fn test_time_frames() {
        assert_eq!(TimeFrame::ThirtyMinutes.as_millis(), 30 * 60 * 1000);
        assert_eq!(TimeFrame::FourWeeks.as_millis(), 28 * 24 * 60 * 60 * 1000);

        let parsed: TimeFrame = serde_json::from_str("\"7d\"").unwrap();
        assert_eq!(parsed, TimeFrame::SevenDays);
    }

    #[test]
    fn test_symbol_kind_filter() {
        let request = SymbolSearchRequest {
            query: "Widget".into(),
            kind: Some("struct".into()),
            language: None,
            limit: 10,
        };
        assert!(request.validate().is_ok());
        assert_eq!(request.kind_filter(), Some(SymbolKind::Struct));

        let bad = SymbolSearchRequest {
            query: "Widget".into(),
            kind: Some("gadget".into()),
            language: None,
            limit: 10,
        };
        assert_eq!(bad.validate().unwrap_err().code(), "validation-error");
    }

    #[test]
    fn test_find_references_needs_identifier() {
        let empty = FindReferencesRequest {
            symbol_id: None,
            name: None,
            max_depth: 1,
        };
        assert_eq!(empty.validate().unwrap_err().code(), "validation-error");
    }

    #[test]
    fn test_detail_selector_mapping() {
        let by_range = ResolveDetailRequest {
            handle: 7,
            range: Some((1, 10)),
            path: None,
        };
        assert_eq!(
            by_range.selector(),
            crate::shaper::DetailSelector::Range { start: 1, end: 10 }
        );

        let all = ResolveDetailRequest {
            handle: 7,
            range: None,
            path: None,
        };
        assert_eq!(all.selector(), crate::shaper::DetailSelector::All);
    }
}

// Symbol extraction
//
// Turns file bytes into symbols and relationships. Dispatch is by file
// extension; unknown extensions still get indexed for text search, they just
// carry no symbols. Parsers are cached per thread, so extraction across
// different files runs lock-free in parallel.

pub mod base;
pub mod go;
pub mod pool;
pub mod python;
pub mod rust;
pub mod typescript;

pub use base::{symbol_id, Relationship, RelationshipKind, Symbol, SymbolKind};
pub use pool::ExtractorPool;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use tree_sitter::{Language, Parser, Tree};

/// How many leading bytes the binary heuristic inspects
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Result of extracting one file
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Language name, or "text" for unsupported extensions
    pub language: String,
    /// Stable 32-byte content hash, hex encoded
    pub file_hash: String,
    pub symbols: Vec<Symbol>,
    pub relationships: Vec<Relationship>,
    /// Why extraction produced no symbols, when it did not run
    pub skipped: Option<SkipReason>,
}

/// Reasons a file is listed without symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Binary,
    TooLarge,
    UnsupportedExtension,
    ParseFailure,
}

/// Stable content hash for file bytes: blake3, hex encoded (64 chars)
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Language name for a path, None when no grammar covers the extension
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "rs" => Some("rust"),
        "py" | "pyi" => Some("python"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        _ => None,
    }
}

fn grammar_for(language: &str) -> Option<Language> {
    match language {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        _ => None,
    }
}

thread_local! {
    static PARSERS: RefCell<HashMap<&'static str, Parser>> = RefCell::new(HashMap::new());
}

/// All languages the extractor set covers
pub const SUPPORTED_LANGUAGES: &[&str] = &["rust", "python", "typescript", "go"];

/// Load this thread's parsers for every supported language. Called from
/// each pool worker at startup so the first real extraction never pays
/// grammar-loading latency.
pub fn warm_parsers() {
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        for &language in SUPPORTED_LANGUAGES {
            if parsers.contains_key(language) {
                continue;
            }
            let mut parser = Parser::new();
            if let Some(grammar) = grammar_for(language) {
                if parser.set_language(&grammar).is_ok() {
                    parsers.insert(language, parser);
                }
            }
        }
    });
}

/// Parse source text with this thread's cached parser for `language`
pub fn parse_source(language: &'static str, source: &str) -> Option<Tree> {
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        if !parsers.contains_key(language) {
            let mut parser = Parser::new();
            parser.set_language(&grammar_for(language)?).ok()?;
            parsers.insert(language, parser);
        }
        parsers.get_mut(language)?.parse(source, None)
    })
}

/// Dispatches extraction across languages and applies the skip heuristics
#[derive(Debug, Clone)]
pub struct ExtractorManager {
    max_file_size: u64,
}

impl ExtractorManager {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn supported_languages(&self) -> &'static [&'static str] {
        SUPPORTED_LANGUAGES
    }

    /// Extract symbols and relationships from file bytes.
    ///
    /// Never errors: binary files, oversized files, unknown extensions, and
    /// parse failures all degrade to an empty symbol set so the file still
    /// lands in the file table and the text index.
    pub fn extract(&self, path: &Path, bytes: &[u8]) -> ExtractionResult {
        let file_hash = content_hash(bytes);

        if is_binary(bytes) {
            return ExtractionResult {
                language: "binary".to_string(),
                file_hash,
                symbols: Vec::new(),
                relationships: Vec::new(),
                skipped: Some(SkipReason::Binary),
            };
        }

        if bytes.len() as u64 > self.max_file_size {
            debug!(
                "Skipping extraction for {} ({} bytes over cap)",
                path.display(),
                bytes.len()
            );
            return ExtractionResult {
                language: language_for_path(path).unwrap_or("text").to_string(),
                file_hash,
                symbols: Vec::new(),
                relationships: Vec::new(),
                skipped: Some(SkipReason::TooLarge),
            };
        }

        let Some(language) = language_for_path(path) else {
            return ExtractionResult {
                language: "text".to_string(),
                file_hash,
                symbols: Vec::new(),
                relationships: Vec::new(),
                skipped: Some(SkipReason::UnsupportedExtension),
            };
        };

        let content = String::from_utf8_lossy(bytes).into_owned();
        let path_str = path.to_string_lossy().into_owned();

        let parsed = parse_source(language, &content);
        let Some(tree) = parsed else {
            warn!("Parse failure for {}; indexing without symbols", path.display());
            return ExtractionResult {
                language: language.to_string(),
                file_hash,
                symbols: Vec::new(),
                relationships: Vec::new(),
                skipped: Some(SkipReason::ParseFailure),
            };
        };

        let (symbols, relationships) = match language {
            "rust" => rust::RustExtractor::new(path_str, content).extract(&tree),
            "python" => python::PythonExtractor::new(path_str, content).extract(&tree),
            "typescript" => typescript::TypeScriptExtractor::new(path_str, content).extract(&tree),
            "go" => go::GoExtractor::new(path_str, content).extract(&tree),
            _ => (Vec::new(), Vec::new()),
        };

        ExtractionResult {
            language: language.to_string(),
            file_hash,
            symbols,
            relationships,
            skipped: None,
        }
    }
}

/// Null byte within the first 8 KiB means binary
fn is_binary(bytes: &[u8]) -> bool {
    let end = bytes.len().min(BINARY_SNIFF_LEN);
    bytes[..end].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_hash_is_pure_function_of_bytes() {
        let a = content_hash(b"fn main() {}");
        let b = content_hash(b"fn main() {}");
        let c = content_hash(b"fn main() { }");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 bytes hex encoded
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_binary_detection() {
        let manager = ExtractorManager::new(1024 * 1024);
        let result = manager.extract(&PathBuf::from("blob.rs"), b"\x00\x01\x02binary");
        assert_eq!(result.skipped, Some(SkipReason::Binary));
        assert!(result.symbols.is_empty());
        assert!(!result.file_hash.is_empty());
    }

    #[test]
    fn test_size_cap() {
        let manager = ExtractorManager::new(8);
        let result = manager.extract(&PathBuf::from("big.rs"), b"fn main() {} // padding");
        assert_eq!(result.skipped, Some(SkipReason::TooLarge));
        assert!(result.symbols.is_empty());
    }

    #[test]
    fn test_unknown_extension_still_hashed() {
        let manager = ExtractorManager::new(1024 * 1024);
        let result = manager.extract(&PathBuf::from("notes.adoc"), b"hello world");
        assert_eq!(result.skipped, Some(SkipReason::UnsupportedExtension));
        assert_eq!(result.language, "text");
        assert_eq!(result.file_hash, content_hash(b"hello world"));
    }

    #[test]
    fn test_extraction_deterministic_for_same_bytes() {
        let manager = ExtractorManager::new(1024 * 1024);
        let source = b"pub struct Alpha { pub beta: u32 }\n";
        let path = PathBuf::from("src/alpha.rs");

        let first = manager.extract(&path, source);
        let second = manager.extract(&path, source);

        assert_eq!(first.file_hash, second.file_hash);
        assert_eq!(first.symbols, second.symbols);
        assert!(first.symbols.iter().any(|s| s.name == "Alpha"));
    }

    #[test]
    fn test_language_dispatch() {
        assert_eq!(language_for_path(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(language_for_path(Path::new("a/b.py")), Some("python"));
        assert_eq!(language_for_path(Path::new("a/b.tsx")), Some("typescript"));
        assert_eq!(language_for_path(Path::new("a/b.go")), Some("go"));
        assert_eq!(language_for_path(Path::new("a/b.zig")), None);
        assert_eq!(language_for_path(Path::new("Makefile")), None);
    }
}

// Base extractor types
//
// Core data model shared by every language extractor: symbols, relationships,
// and the helpers extractors use to build them from tree-sitter nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tree_sitter::Node;

/// A code symbol (class, function, field, ...) extracted from source code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    /// Content-addressed 128-bit identifier, hex encoded.
    /// Derived from (file_path, name, start_line, kind) so edits elsewhere
    /// in the file leave the id unchanged.
    pub id: String,
    /// Symbol name as it appears in code
    pub name: String,
    /// Kind of symbol
    pub kind: SymbolKind,
    /// Programming language this symbol is from
    pub language: String,
    /// File path where this symbol is defined
    pub file_path: String,
    /// Declaration signature (first line of the definition)
    pub signature: String,
    /// Start line number (1-based)
    pub start_line: u32,
    /// End line number (1-based)
    pub end_line: u32,
    /// Start column (0-based)
    pub start_col: u32,
    /// End column (0-based)
    pub end_col: u32,
    /// Modifier keywords (pub, static, async, ...)
    #[serde(default)]
    pub modifiers: BTreeSet<String>,
    /// Extended base class, if any
    #[serde(default)]
    pub base_type: Option<String>,
    /// Implemented interfaces / traits
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    /// Documentation comment preceding the definition
    #[serde(default)]
    pub doc_comment: Option<String>,
    /// Id of the enclosing symbol (method -> class, ...)
    #[serde(default)]
    pub containing_symbol_id: Option<String>,
}

impl Symbol {
    /// Whether this symbol introduces a top-level type definition
    /// (the kinds the type-definition scoring factor cares about)
    pub fn is_type_definition(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::TypeAlias
        )
    }
}

/// Types of symbols that can be extracted from source code
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Struct,
    Enum,
    Method,
    Function,
    Field,
    Property,
    TypeAlias,
    Module,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Method => "method",
            Self::Function => "function",
            Self::Field => "field",
            Self::Property => "property",
            Self::TypeAlias => "type_alias",
            Self::Module => "module",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "class" => Self::Class,
            "interface" => Self::Interface,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "method" => Self::Method,
            "function" => Self::Function,
            "field" => Self::Field,
            "property" => Self::Property,
            "type_alias" => Self::TypeAlias,
            "module" => Self::Module,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two symbols
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub source_symbol_id: String,
    pub target_symbol_id: String,
    pub kind: RelationshipKind,
    /// Line where the relationship occurs (1-based)
    pub line: u32,
    #[serde(default)]
    pub bidirectional: bool,
}

/// Types of relationships between symbols
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Implements,
    Extends,
    References,
    Contains,
    RelatedTo,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Implements => "implements",
            Self::Extends => "extends",
            Self::References => "references",
            Self::Contains => "contains",
            Self::RelatedTo => "related_to",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "calls" => Self::Calls,
            "implements" => Self::Implements,
            "extends" => Self::Extends,
            "references" => Self::References,
            "contains" => Self::Contains,
            _ => Self::RelatedTo,
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-addressed symbol id: first 16 bytes of
/// blake3(file_path || name || start_line || kind), hex encoded (128 bits).
pub fn symbol_id(file_path: &str, name: &str, start_line: u32, kind: SymbolKind) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(&start_line.to_le_bytes());
    hasher.update(kind.as_str().as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash.as_bytes()[..16])
}

/// Shared state and helpers for a single extraction pass over one file
pub struct ExtractorBase {
    pub language: &'static str,
    pub file_path: String,
    pub content: String,
}

impl ExtractorBase {
    pub fn new(language: &'static str, file_path: String, content: String) -> Self {
        Self {
            language,
            file_path,
            content,
        }
    }

    /// Text of a tree-sitter node, empty on out-of-range byte offsets
    pub fn node_text(&self, node: &Node) -> String {
        self.content
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
            .to_string()
    }

    /// First line of a node's text, used as the signature
    pub fn signature_of(&self, node: &Node) -> String {
        let text = self.node_text(node);
        text.lines().next().unwrap_or("").trim_end().to_string()
    }

    /// Collect a doc comment from the sibling comment block directly above
    /// `node`, if any. Comment markers are stripped per line.
    pub fn doc_comment_above(&self, node: &Node) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut sibling = node.prev_sibling();

        while let Some(prev) = sibling {
            if !prev.kind().contains("comment") {
                break;
            }
            let text = self.node_text(&prev);
            let cleaned = text
                .lines()
                .map(|l| {
                    l.trim_start()
                        .trim_start_matches("///")
                        .trim_start_matches("//!")
                        .trim_start_matches("//")
                        .trim_start_matches("/*")
                        .trim_end_matches("*/")
                        .trim_start_matches('*')
                        .trim_start_matches('#')
                        .trim()
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("\n");
            lines.insert(0, cleaned);
            sibling = prev.prev_sibling();
        }

        if lines.is_empty() {
            return None;
        }
        let joined = lines.join("\n").trim().to_string();
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Build a symbol at the location of `node`, with the id derived from
    /// the definition site.
    pub fn make_symbol(&self, name: &str, kind: SymbolKind, node: &Node) -> Symbol {
        let start = node.start_position();
        let end = node.end_position();
        let start_line = start.row as u32 + 1;

        Symbol {
            id: symbol_id(&self.file_path, name, start_line, kind),
            name: name.to_string(),
            kind,
            language: self.language.to_string(),
            file_path: self.file_path.clone(),
            signature: self.signature_of(node),
            start_line,
            end_line: end.row as u32 + 1,
            start_col: start.column as u32,
            end_col: end.column as u32,
            modifiers: BTreeSet::new(),
            base_type: None,
            interfaces: BTreeSet::new(),
            doc_comment: self.doc_comment_above(node),
            containing_symbol_id: None,
        }
    }

    /// Containment edge from an enclosing symbol to a member
    pub fn contains_edge(&self, parent: &Symbol, child: &Symbol) -> Relationship {
        Relationship {
            source_symbol_id: parent.id.clone(),
            target_symbol_id: child.id.clone(),
            kind: RelationshipKind::Contains,
            line: child.start_line,
            bidirectional: false,
        }
    }
}

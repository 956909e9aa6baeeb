// Inverted index schema
//
// One document per file. Fields come in three groups: stored for display,
// indexed for search (code analyzer), and fast (DocValues) for sort and
// facet. `path` is the replace-by-primary-key term.

use crate::extractors::{Symbol, SymbolKind};
use crate::search::analyzers::CODE_ANALYZER;
use tantivy::schema::{
    Facet, FacetOptions, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST,
    INDEXED, STORED, STRING,
};
use tantivy::TantivyDocument;

/// Query-time field boosts
pub const BOOST_CONTENT_SYMBOLS: f32 = 2.5;
pub const BOOST_TYPE_NAMES: f32 = 2.0;
pub const BOOST_FILENAME: f32 = 2.0;
pub const BOOST_CONTENT: f32 = 1.0;
pub const BOOST_ALL: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct DocumentSchema {
    schema: Schema,
    pub fields: DocumentFields,
}

#[derive(Debug, Clone)]
pub struct DocumentFields {
    // Primary key
    pub path: Field,

    // Stored for display
    pub extension: Field,
    pub content: Field,
    pub type_info_json: Field,
    pub symbol_count: Field,
    pub method_count: Field,
    pub content_hash: Field,

    // Indexed for search
    pub content_symbols: Field,
    pub type_names: Field,
    pub type_def: Field,
    pub path_tokens: Field,
    pub filename: Field,
    pub all: Field,

    // DocValues for sort/facet
    pub last_modified_dv: Field,
    pub size_dv: Field,
    pub extension_dv: Field,
    pub language_dv: Field,
    pub kind_facet: Field,
}

impl DocumentSchema {
    pub fn build() -> Self {
        let mut builder = Schema::builder();

        let code_indexed = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CODE_ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let code_stored = code_indexed.clone().set_stored();

        let path = builder.add_text_field("path", STRING | STORED);
        let extension = builder.add_text_field("extension", STRING | STORED);
        let content = builder.add_text_field("content", code_stored);
        let type_info_json = builder.add_text_field(
            "type_info_json",
            TextOptions::default().set_stored(),
        );
        let symbol_count = builder.add_u64_field("symbol_count", STORED);
        let method_count = builder.add_u64_field("method_count", STORED);
        let content_hash = builder.add_text_field("content_hash", STRING | STORED);

        let content_symbols = builder.add_text_field("content_symbols", code_indexed.clone());
        let type_names = builder.add_text_field("type_names", code_indexed.clone());
        let type_def = builder.add_text_field("type_def", code_indexed.clone());
        let path_tokens = builder.add_text_field("path_tokens", code_indexed.clone());
        let filename = builder.add_text_field("filename", code_indexed.clone());
        let all = builder.add_text_field("all", code_indexed);

        let last_modified_dv = builder.add_i64_field("last_modified_dv", FAST | INDEXED);
        let size_dv = builder.add_i64_field("size_dv", FAST | INDEXED);
        let extension_dv = builder.add_text_field("extension_dv", STRING | FAST);
        let language_dv = builder.add_text_field("language_dv", STRING | FAST);
        let kind_facet = builder.add_facet_field("kind_facet", FacetOptions::default());

        let schema = builder.build();
        Self {
            schema,
            fields: DocumentFields {
                path,
                extension,
                content,
                type_info_json,
                symbol_count,
                method_count,
                content_hash,
                content_symbols,
                type_names,
                type_def,
                path_tokens,
                filename,
                all,
                last_modified_dv,
                size_dv,
                extension_dv,
                language_dv,
                kind_facet,
            },
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Fields the `all` copy-field mirrors, with their query-time boosts
    pub fn boosted_search_fields(&self) -> Vec<(Field, f32)> {
        vec![
            (self.fields.content_symbols, BOOST_CONTENT_SYMBOLS),
            (self.fields.type_names, BOOST_TYPE_NAMES),
            (self.fields.filename, BOOST_FILENAME),
            (self.fields.content, BOOST_CONTENT),
            (self.fields.all, BOOST_ALL),
        ]
    }
}

/// Everything needed to build one file's document
#[derive(Debug, Clone)]
pub struct FileDocument {
    pub path: String,
    pub language: String,
    pub content: String,
    pub content_hash: String,
    pub size: i64,
    pub last_modified: i64,
    pub symbols: Vec<Symbol>,
}

impl FileDocument {
    pub fn filename(&self) -> String {
        std::path::Path::new(&self.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> String {
        std::path::Path::new(&self.path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    fn type_definitions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_type_definition())
    }

    /// "kind name" per top-level definition, plus "implements X" and
    /// "extends X" markers so implementation queries can match
    pub fn type_def_entries(&self) -> Vec<String> {
        let mut entries = Vec::new();
        for symbol in self.type_definitions() {
            entries.push(format!("{} {}", symbol.kind.as_str(), symbol.name));
            for iface in &symbol.interfaces {
                entries.push(format!("implements {iface}"));
            }
            if let Some(base) = &symbol.base_type {
                entries.push(format!("extends {base}"));
            }
        }
        entries
    }

    pub fn type_names(&self) -> Vec<String> {
        self.type_definitions().map(|s| s.name.clone()).collect()
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.name.clone()).collect()
    }

    pub fn method_count(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| matches!(s.kind, SymbolKind::Method | SymbolKind::Function))
            .count()
    }

    /// Build the tantivy document. The `all` field is a copy of the
    /// searchable fields so single-field queries can span everything.
    pub fn to_document(&self, schema: &DocumentSchema) -> TantivyDocument {
        let f = &schema.fields;
        let mut doc = TantivyDocument::new();

        let filename = self.filename();
        let symbol_names = self.symbol_names().join(" ");
        let type_names = self.type_names().join(" ");
        let type_defs = self.type_def_entries().join(" ");
        let path_tokens = self.path.replace(['/', '\\'], " ");

        doc.add_text(f.path, &self.path);
        doc.add_text(f.extension, self.extension());
        doc.add_text(f.content, &self.content);
        doc.add_text(
            f.type_info_json,
            serde_json::to_string(&self.symbols).unwrap_or_else(|_| "[]".to_string()),
        );
        doc.add_u64(f.symbol_count, self.symbols.len() as u64);
        doc.add_u64(f.method_count, self.method_count() as u64);
        doc.add_text(f.content_hash, &self.content_hash);

        doc.add_text(f.content_symbols, &symbol_names);
        doc.add_text(f.type_names, &type_names);
        doc.add_text(f.type_def, &type_defs);
        doc.add_text(f.path_tokens, &path_tokens);
        doc.add_text(f.filename, &filename);

        let all = [
            self.content.as_str(),
            symbol_names.as_str(),
            type_names.as_str(),
            filename.as_str(),
            path_tokens.as_str(),
        ]
        .join(" ");
        doc.add_text(f.all, &all);

        doc.add_i64(f.last_modified_dv, self.last_modified);
        doc.add_i64(f.size_dv, self.size);
        doc.add_text(f.extension_dv, self.extension());
        doc.add_text(f.language_dv, &self.language);

        for kind in self
            .symbols
            .iter()
            .map(|s| s.kind.as_str())
            .collect::<std::collections::BTreeSet<_>>()
        {
            doc.add_facet(f.kind_facet, Facet::from(format!("/kind/{kind}").as_str()));
        }

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::symbol_id;
    use std::collections::BTreeSet;

    fn sample() -> FileDocument {
        let mut class = Symbol {
            id: symbol_id("src/user_service.ts", "UserService", 3, SymbolKind::Class),
            name: "UserService".into(),
            kind: SymbolKind::Class,
            language: "typescript".into(),
            file_path: "src/user_service.ts".into(),
            signature: "class UserService implements IUserService".into(),
            start_line: 3,
            end_line: 40,
            start_col: 0,
            end_col: 1,
            modifiers: BTreeSet::new(),
            base_type: Some("BaseService".into()),
            interfaces: BTreeSet::new(),
            doc_comment: None,
            containing_symbol_id: None,
        };
        class.interfaces.insert("IUserService".into());

        let method = Symbol {
            id: symbol_id("src/user_service.ts", "findById", 10, SymbolKind::Method),
            name: "findById".into(),
            kind: SymbolKind::Method,
            language: "typescript".into(),
            file_path: "src/user_service.ts".into(),
            signature: "findById(id: string)".into(),
            start_line: 10,
            end_line: 14,
            start_col: 2,
            end_col: 3,
            modifiers: BTreeSet::new(),
            base_type: None,
            interfaces: BTreeSet::new(),
            doc_comment: None,
            containing_symbol_id: None,
        };

        FileDocument {
            path: "src/user_service.ts".into(),
            language: "typescript".into(),
            content: "class UserService { findById() {} }".into(),
            content_hash: "hash".into(),
            size: 64,
            last_modified: 1_700_000_000_000,
            symbols: vec![class, method],
        }
    }

    #[test]
    fn test_type_def_entries() {
        let doc = sample();
        let entries = doc.type_def_entries();
        assert!(entries.contains(&"class UserService".to_string()));
        assert!(entries.contains(&"implements IUserService".to_string()));
        assert!(entries.contains(&"extends BaseService".to_string()));
        // Methods are not type definitions
        assert!(!entries.iter().any(|e| e.contains("findById")));
    }

    #[test]
    fn test_derived_fields() {
        let doc = sample();
        assert_eq!(doc.filename(), "user_service.ts");
        assert_eq!(doc.extension(), "ts");
        assert_eq!(doc.type_names(), vec!["UserService".to_string()]);
        assert_eq!(doc.method_count(), 1);
    }

    #[test]
    fn test_document_builds_with_all_fields() {
        let schema = DocumentSchema::build();
        let doc = sample().to_document(&schema);

        use tantivy::schema::Value;
        let path = doc
            .get_first(schema.fields.path)
            .and_then(|v| v.as_str())
            .unwrap();
        assert_eq!(path, "src/user_service.ts");

        let type_info = doc
            .get_first(schema.fields.type_info_json)
            .and_then(|v| v.as_str())
            .unwrap();
        let symbols: Vec<Symbol> = serde_json::from_str(type_info).unwrap();
        assert_eq!(symbols.len(), 2);

        let count = doc
            .get_first(schema.fields.symbol_count)
            .and_then(|v| v.as_u64())
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_boosted_fields_ordering() {
        let schema = DocumentSchema::build();
        let boosts = schema.boosted_search_fields();
        assert_eq!(boosts.len(), 5);
        assert_eq!(boosts[0].1, 2.5);
        assert_eq!(boosts[4].1, 0.8);
    }
}

// Rust symbol extraction
//
// Handles structs, enums, traits, impl blocks (methods linked to the type
// they implement for), free functions, modules, and type aliases.

use crate::extractors::base::{
    ExtractorBase, Relationship, RelationshipKind, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

pub struct RustExtractor {
    base: ExtractorBase,
}

impl RustExtractor {
    pub fn new(file_path: String, content: String) -> Self {
        Self {
            base: ExtractorBase::new("rust", file_path, content),
        }
    }

    pub fn extract(&mut self, tree: &Tree) -> (Vec<Symbol>, Vec<Relationship>) {
        let mut symbols = Vec::new();
        let mut relationships = Vec::new();
        self.walk(tree.root_node(), None, &mut symbols, &mut relationships);
        (symbols, relationships)
    }

    fn walk(
        &mut self,
        node: Node,
        parent: Option<&Symbol>,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        match node.kind() {
            "struct_item" => {
                let symbol = self.named_symbol(&node, SymbolKind::Struct, parent);
                if let Some(symbol) = symbol {
                    self.extract_fields(&node, &symbol, symbols, relationships);
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                }
            }
            "enum_item" => {
                if let Some(symbol) = self.named_symbol(&node, SymbolKind::Enum, parent) {
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                }
            }
            "trait_item" => {
                if let Some(symbol) = self.named_symbol(&node, SymbolKind::Interface, parent) {
                    self.walk_children(&node, Some(&symbol), symbols, relationships);
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                    return;
                }
            }
            "impl_item" => {
                self.extract_impl(&node, symbols, relationships);
                return;
            }
            "function_item" => {
                let kind = if parent.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(mut symbol) = self.named_symbol(&node, kind, parent) {
                    self.collect_modifiers(&node, &mut symbol);
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                }
                return;
            }
            "function_signature_item" => {
                // Trait method declarations
                if let Some(symbol) = self.named_symbol(&node, SymbolKind::Method, parent) {
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                }
                return;
            }
            "mod_item" => {
                if let Some(symbol) = self.named_symbol(&node, SymbolKind::Module, parent) {
                    self.walk_children(&node, Some(&symbol), symbols, relationships);
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                    return;
                }
            }
            "type_item" => {
                if let Some(symbol) = self.named_symbol(&node, SymbolKind::TypeAlias, parent) {
                    self.push_with_parent_edge(symbol, parent, symbols, relationships);
                }
                return;
            }
            _ => {}
        }

        self.walk_children(&node, parent, symbols, relationships);
    }

    fn walk_children(
        &mut self,
        node: &Node,
        parent: Option<&Symbol>,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk(child, parent, symbols, relationships);
        }
    }

    fn named_symbol(
        &self,
        node: &Node,
        kind: SymbolKind,
        parent: Option<&Symbol>,
    ) -> Option<Symbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.base.node_text(&name_node);
        if name.is_empty() {
            return None;
        }

        let mut symbol = self.base.make_symbol(&name, kind, node);
        symbol.containing_symbol_id = parent.map(|p| p.id.clone());
        Some(symbol)
    }

    /// Methods inside an impl block become Method symbols contained by the
    /// type the block implements for; `impl Trait for Type` also records an
    /// implements edge on the type symbol.
    fn extract_impl(
        &mut self,
        node: &Node,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        let type_name = node
            .child_by_field_name("type")
            .map(|n| self.base.node_text(&n))
            .unwrap_or_default();
        if type_name.is_empty() {
            return;
        }
        // Strip generic arguments: "Foo<T>" owns methods under "Foo"
        let type_name = type_name
            .split('<')
            .next()
            .unwrap_or(&type_name)
            .to_string();

        let trait_name = node
            .child_by_field_name("trait")
            .map(|n| self.base.node_text(&n));

        // Find the type symbol this impl attaches to, if it lives in the
        // same file. Methods still get extracted when it does not.
        let owner = symbols
            .iter()
            .find(|s| s.name == type_name && s.is_type_definition())
            .cloned();

        if let (Some(owner_sym), Some(trait_name)) = (&owner, &trait_name) {
            let trait_base = trait_name.split('<').next().unwrap_or(trait_name);
            // Record the trait name on the type symbol so implements-queries
            // and the interface scoring factor can see it.
            if let Some(existing) = symbols.iter_mut().find(|s| s.id == owner_sym.id) {
                existing.interfaces.insert(trait_base.to_string());
            }
            if let Some(trait_sym) = symbols
                .iter()
                .find(|s| s.name == trait_base && s.kind == SymbolKind::Interface)
            {
                relationships.push(Relationship {
                    source_symbol_id: owner_sym.id.clone(),
                    target_symbol_id: trait_sym.id.clone(),
                    kind: RelationshipKind::Implements,
                    line: node.start_position().row as u32 + 1,
                    bidirectional: false,
                });
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let children: Vec<Node> = body.children(&mut cursor).collect();
            for child in children {
                if child.kind() == "function_item" {
                    if let Some(mut method) =
                        self.named_symbol(&child, SymbolKind::Method, owner.as_ref())
                    {
                        self.collect_modifiers(&child, &mut method);
                        if let Some(owner_sym) = &owner {
                            relationships.push(self.base.contains_edge(owner_sym, &method));
                        }
                        symbols.push(method);
                    }
                }
            }
        }
    }

    fn extract_fields(
        &mut self,
        node: &Node,
        owner: &Symbol,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        if body.kind() != "field_declaration_list" {
            return;
        }

        let mut cursor = body.walk();
        let children: Vec<Node> = body.children(&mut cursor).collect();
        for child in children {
            if child.kind() == "field_declaration" {
                if let Some(mut field) = self.named_symbol(&child, SymbolKind::Field, Some(owner)) {
                    field.containing_symbol_id = Some(owner.id.clone());
                    relationships.push(self.base.contains_edge(owner, &field));
                    symbols.push(field);
                }
            }
        }
    }

    fn collect_modifiers(&self, node: &Node, symbol: &mut Symbol) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "visibility_modifier" => {
                    symbol.modifiers.insert("pub".to_string());
                }
                "function_modifiers" => {
                    let text = self.base.node_text(&child);
                    for word in ["async", "unsafe", "const", "extern"] {
                        if text.contains(word) {
                            symbol.modifiers.insert(word.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn push_with_parent_edge(
        &mut self,
        symbol: Symbol,
        parent: Option<&Symbol>,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        if let Some(parent) = parent {
            relationships.push(self.base.contains_edge(parent, &symbol));
        }
        symbols.push(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::parse_source;

    const SAMPLE: &str = r#"
/// Keeps sessions alive.
pub struct SessionManager {
    store: String,
}

pub trait Refresh {
    fn refresh(&mut self);
}

impl Refresh for SessionManager {
    fn refresh(&mut self) {}
}

impl SessionManager {
    pub async fn connect(&self) -> bool {
        true
    }
}

pub fn standalone() {}

pub type SessionId = u64;
"#;

    fn extract(source: &str) -> (Vec<Symbol>, Vec<Relationship>) {
        let tree = parse_source("rust", source).unwrap();
        RustExtractor::new("src/session.rs".into(), source.into()).extract(&tree)
    }

    #[test]
    fn test_extracts_struct_trait_and_methods() {
        let (symbols, _) = extract(SAMPLE);

        let manager = symbols
            .iter()
            .find(|s| s.name == "SessionManager" && s.kind == SymbolKind::Struct)
            .expect("struct extracted");
        assert!(manager.doc_comment.as_deref().unwrap().contains("Keeps sessions alive"));
        assert!(manager.interfaces.contains("Refresh"));

        let trait_sym = symbols
            .iter()
            .find(|s| s.name == "Refresh")
            .expect("trait extracted");
        assert_eq!(trait_sym.kind, SymbolKind::Interface);

        let connect = symbols
            .iter()
            .find(|s| s.name == "connect")
            .expect("method extracted");
        assert_eq!(connect.kind, SymbolKind::Method);
        assert_eq!(connect.containing_symbol_id.as_ref(), Some(&manager.id));
        assert!(connect.modifiers.contains("async"));
        assert!(connect.modifiers.contains("pub"));

        let standalone = symbols.iter().find(|s| s.name == "standalone").unwrap();
        assert_eq!(standalone.kind, SymbolKind::Function);

        let alias = symbols.iter().find(|s| s.name == "SessionId").unwrap();
        assert_eq!(alias.kind, SymbolKind::TypeAlias);
    }

    #[test]
    fn test_implements_relationship() {
        let (symbols, relationships) = extract(SAMPLE);
        let manager = symbols.iter().find(|s| s.name == "SessionManager").unwrap();
        let refresh = symbols.iter().find(|s| s.name == "Refresh").unwrap();

        assert!(relationships.iter().any(|r| {
            r.kind == RelationshipKind::Implements
                && r.source_symbol_id == manager.id
                && r.target_symbol_id == refresh.id
        }));
    }

    #[test]
    fn test_fields_contained_in_struct() {
        let (symbols, relationships) = extract(SAMPLE);
        let manager = symbols.iter().find(|s| s.name == "SessionManager").unwrap();
        let store = symbols
            .iter()
            .find(|s| s.name == "store" && s.kind == SymbolKind::Field)
            .unwrap();

        assert!(relationships.iter().any(|r| {
            r.kind == RelationshipKind::Contains
                && r.source_symbol_id == manager.id
                && r.target_symbol_id == store.id
        }));
    }
}

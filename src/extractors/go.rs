// Go symbol extraction
//
// Structs, interfaces, type aliases, functions, and methods. Methods are
// linked to their receiver type when it is declared in the same file.

use crate::extractors::base::{
    ExtractorBase, Relationship, RelationshipKind, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

pub struct GoExtractor {
    base: ExtractorBase,
}

impl GoExtractor {
    pub fn new(file_path: String, content: String) -> Self {
        Self {
            base: ExtractorBase::new("go", file_path, content),
        }
    }

    pub fn extract(&mut self, tree: &Tree) -> (Vec<Symbol>, Vec<Relationship>) {
        let mut symbols = Vec::new();
        let mut relationships = Vec::new();

        // Types first so method receivers can resolve to them
        self.walk_types(tree.root_node(), &mut symbols, &mut relationships);
        self.walk_functions(tree.root_node(), &mut symbols, &mut relationships);

        (symbols, relationships)
    }

    fn walk_types(
        &mut self,
        node: Node,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        if node.kind() == "type_spec" {
            self.extract_type_spec(&node, symbols, relationships);
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk_types(child, symbols, relationships);
        }
    }

    fn walk_functions(
        &mut self,
        node: Node,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        match node.kind() {
            "function_declaration" => {
                if let Some(func) = self.named_symbol(&node, SymbolKind::Function) {
                    symbols.push(func);
                }
            }
            "method_declaration" => {
                if let Some(mut method) = self.named_symbol(&node, SymbolKind::Method) {
                    if let Some(receiver) = self.receiver_type(&node) {
                        if let Some(owner) = symbols
                            .iter()
                            .find(|s| s.name == receiver && s.is_type_definition())
                        {
                            method.containing_symbol_id = Some(owner.id.clone());
                            relationships.push(Relationship {
                                source_symbol_id: owner.id.clone(),
                                target_symbol_id: method.id.clone(),
                                kind: RelationshipKind::Contains,
                                line: method.start_line,
                                bidirectional: false,
                            });
                        }
                    }
                    symbols.push(method);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk_functions(child, symbols, relationships);
        }
    }

    fn extract_type_spec(
        &mut self,
        node: &Node,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.base.node_text(&name_node);
        if name.is_empty() {
            return;
        }

        let kind = match node.child_by_field_name("type").map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::TypeAlias,
        };

        // The doc comment sits above the enclosing type_declaration
        let anchor = node
            .parent()
            .filter(|p| p.kind() == "type_declaration")
            .unwrap_or(*node);

        let mut symbol = self.base.make_symbol(&name, kind, node);
        if symbol.doc_comment.is_none() {
            symbol.doc_comment = self.base.doc_comment_above(&anchor);
        }

        if kind == SymbolKind::Struct {
            if let Some(ty) = node.child_by_field_name("type") {
                self.extract_struct_fields(&ty, &symbol, symbols, relationships);
            }
        }

        symbols.push(symbol);
    }

    fn extract_struct_fields(
        &mut self,
        struct_type: &Node,
        owner: &Symbol,
        symbols: &mut Vec<Symbol>,
        relationships: &mut Vec<Relationship>,
    ) {
        let Some(list) = struct_type
            .children(&mut struct_type.walk())
            .find(|c| c.kind() == "field_declaration_list")
        else {
            return;
        };

        let mut cursor = list.walk();
        let fields: Vec<Node> = list.children(&mut cursor).collect();
        for field in fields {
            if field.kind() != "field_declaration" {
                continue;
            }
            // A field_declaration may declare several names: "a, b int"
            let mut fc = field.walk();
            for name_node in field
                .named_children(&mut fc)
                .filter(|c| c.kind() == "field_identifier")
            {
                let name = self.base.node_text(&name_node);
                if name.is_empty() {
                    continue;
                }
                let mut sym = self.base.make_symbol(&name, SymbolKind::Field, &field);
                sym.containing_symbol_id = Some(owner.id.clone());
                relationships.push(self.base.contains_edge(owner, &sym));
                symbols.push(sym);
            }
        }
    }

    fn named_symbol(&self, node: &Node, kind: SymbolKind) -> Option<Symbol> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.base.node_text(&name_node);
        if name.is_empty() {
            return None;
        }
        Some(self.base.make_symbol(&name, kind, node))
    }

    /// Receiver base type of a method: `func (s *Store) Get()` -> "Store"
    fn receiver_type(&self, node: &Node) -> Option<String> {
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        for param in receiver.named_children(&mut cursor) {
            if param.kind() == "parameter_declaration" {
                if let Some(ty) = param.child_by_field_name("type") {
                    let text = self.base.node_text(&ty);
                    return Some(text.trim_start_matches('*').to_string());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::parse_source;

    const SAMPLE: &str = r#"
package store

// Store keeps things.
type Store struct {
	name string
	size int
}

type Closer interface {
	Close() error
}

type ID = string

func (s *Store) Get(key string) string {
	return s.name
}

func NewStore() *Store {
	return &Store{}
}
"#;

    fn extract(source: &str) -> (Vec<Symbol>, Vec<Relationship>) {
        let tree = parse_source("go", source).unwrap();
        GoExtractor::new("store.go".into(), source.into()).extract(&tree)
    }

    #[test]
    fn test_types_extracted() {
        let (symbols, _) = extract(SAMPLE);

        let store = symbols.iter().find(|s| s.name == "Store").unwrap();
        assert_eq!(store.kind, SymbolKind::Struct);
        assert!(store.doc_comment.as_deref().unwrap().contains("keeps things"));

        let closer = symbols.iter().find(|s| s.name == "Closer").unwrap();
        assert_eq!(closer.kind, SymbolKind::Interface);

        assert!(symbols
            .iter()
            .any(|s| s.name == "ID" && s.kind == SymbolKind::TypeAlias));
    }

    #[test]
    fn test_method_linked_to_receiver() {
        let (symbols, relationships) = extract(SAMPLE);

        let store = symbols.iter().find(|s| s.name == "Store").unwrap();
        let get = symbols.iter().find(|s| s.name == "Get").unwrap();
        assert_eq!(get.kind, SymbolKind::Method);
        assert_eq!(get.containing_symbol_id.as_ref(), Some(&store.id));

        assert!(symbols
            .iter()
            .any(|s| s.name == "NewStore" && s.kind == SymbolKind::Function));

        assert!(relationships
            .iter()
            .any(|r| r.kind == RelationshipKind::Contains && r.target_symbol_id == get.id));
    }

    #[test]
    fn test_struct_fields() {
        let (symbols, _) = extract(SAMPLE);
        let fields: Vec<_> = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Field)
            .map(|s| s.name.as_str())
            .collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"size"));
    }
}

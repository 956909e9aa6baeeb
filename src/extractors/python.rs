// Python symbol extraction
//
// Classes, methods, functions, and module-level assignments that look like
// constants. Base classes land in base_type/interfaces so inheritance
// queries work across files.

use crate::extractors::base::{
    ExtractorBase, Relationship, RelationshipKind, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

pub struct PythonExtractor {
    base: ExtractorBase,
}

impl PythonExtractor {
    pub fn new(file_path: String, content: String) -> Self {
        Self {
            base: ExtractorBase::new("python", file_path, content),
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
            "class_definition" => {
                if let Some(mut class) = self.named_symbol(&node, SymbolKind::Class, parent) {
                    self.collect_bases(&node, &mut class);
                    if let Some(parent) = parent {
                        relationships.push(self.base.contains_edge(parent, &class));
                    }
                    if let Some(body) = node.child_by_field_name("body") {
                        self.walk_children(&body, Some(&class), symbols, relationships);
                    }
                    symbols.push(class);
                    return;
                }
            }
            "function_definition" => {
                let kind = if parent.map(|p| p.kind == SymbolKind::Class).unwrap_or(false) {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                if let Some(mut func) = self.named_symbol(&node, kind, parent) {
                    if self.is_decorated_with(&node, "property") {
                        func.kind = SymbolKind::Property;
                        // Re-derive the id; kind participates in it
                        func.id = crate::extractors::base::symbol_id(
                            &func.file_path,
                            &func.name,
                            func.start_line,
                            func.kind,
                        );
                    }
                    if self.is_decorated_with(&node, "staticmethod") {
                        func.modifiers.insert("static".to_string());
                    }
                    if node
                        .children(&mut node.walk())
                        .any(|c| c.kind() == "async")
                    {
                        func.modifiers.insert("async".to_string());
                    }
                    if let Some(parent) = parent {
                        relationships.push(self.base.contains_edge(parent, &func));
                    }
                    symbols.push(func);
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
        if symbol.doc_comment.is_none() {
            symbol.doc_comment = self.docstring_of(node);
        }
        Some(symbol)
    }

    /// First string expression in the body, the conventional docstring
    fn docstring_of(&self, node: &Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != "string" {
            return None;
        }
        let text = self.base.node_text(&string);
        let cleaned = text
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    fn collect_bases(&self, node: &Node, class: &mut Symbol) {
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return;
        };
        let mut cursor = superclasses.walk();
        let mut first = true;
        for child in superclasses.named_children(&mut cursor) {
            if child.kind() == "identifier" || child.kind() == "attribute" {
                let name = self.base.node_text(&child);
                if first {
                    class.base_type = Some(name.clone());
                    first = false;
                }
                class.interfaces.insert(name);
            }
        }
    }

    /// Whether the wrapping decorated_definition carries `@name`
    fn is_decorated_with(&self, node: &Node, name: &str) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        if parent.kind() != "decorated_definition" {
            return false;
        }
        let mut cursor = parent.walk();
        let result = parent.children(&mut cursor).any(|c| {
            c.kind() == "decorator" && self.base.node_text(&c).trim_start_matches('@').trim() == name
        });
        result
    }
}

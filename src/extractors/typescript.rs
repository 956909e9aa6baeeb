// TypeScript symbol extraction
//
// Classes (with extends/implements heritage), interfaces, enums, functions,
// methods, type aliases, and arrow functions bound to const declarations.

use crate::extractors::base::{
    ExtractorBase, Relationship, RelationshipKind, Symbol, SymbolKind,
};
use tree_sitter::{Node, Tree};

pub struct TypeScriptExtractor {
    base: ExtractorBase,
}

impl TypeScriptExtractor {
    pub fn new(file_path: String, content: String) -> Self {
        Self {
            base: ExtractorBase::new("typescript", file_path, content),
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
            "class_declaration" | "abstract_class_declaration" => {
                if let Some(mut class) = self.named_symbol(&node, SymbolKind::Class, parent) {
                    if node.kind() == "abstract_class_declaration" {
                        class.modifiers.insert("abstract".to_string());
                    }
                    self.collect_heritage(&node, &mut class);
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
            "interface_declaration" => {
                if let Some(iface) = self.named_symbol(&node, SymbolKind::Interface, parent) {
                    if let Some(parent) = parent {
                        relationships.push(self.base.contains_edge(parent, &iface));
                    }
                    symbols.push(iface);
                }
                return;
            }
            "enum_declaration" => {
                if let Some(e) = self.named_symbol(&node, SymbolKind::Enum, parent) {
                    symbols.push(e);
                }
                return;
            }
            "type_alias_declaration" => {
                if let Some(alias) = self.named_symbol(&node, SymbolKind::TypeAlias, parent) {
                    symbols.push(alias);
                }
                return;
            }
            "function_declaration" => {
                if let Some(mut func) = self.named_symbol(&node, SymbolKind::Function, parent) {
                    self.collect_async(&node, &mut func);
                    symbols.push(func);
                }
                return;
            }
            "method_definition" => {
                if let Some(mut method) = self.named_symbol(&node, SymbolKind::Method, parent) {
                    self.collect_async(&node, &mut method);
                    if let Some(parent) = parent {
                        relationships.push(self.base.contains_edge(parent, &method));
                    }
                    symbols.push(method);
                }
                return;
            }
            "public_field_definition" | "field_definition" => {
                if let Some(field) = self.named_symbol(&node, SymbolKind::Field, parent) {
                    if let Some(parent) = parent {
                        relationships.push(self.base.contains_edge(parent, &field));
                    }
                    symbols.push(field);
                }
                return;
            }
            "variable_declarator" => {
                // const handler = async () => {...}
                if self.has_function_value(&node) {
                    if let Some(func) = self.named_symbol(&node, SymbolKind::Function, parent) {
                        symbols.push(func);
                    }
                }
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

    /// extends X goes to base_type, implements Y, Z to interfaces
    fn collect_heritage(&self, node: &Node, class: &mut Symbol) {
        let mut cursor = node.walk();
        for heritage in node.children(&mut cursor) {
            if heritage.kind() != "class_heritage" {
                continue;
            }
            let mut hc = heritage.walk();
            for clause in heritage.children(&mut hc) {
                match clause.kind() {
                    "extends_clause" => {
                        let mut cc = clause.walk();
                        for value in clause.named_children(&mut cc) {
                            if value.kind() == "identifier" || value.kind() == "type_identifier" {
                                class.base_type = Some(self.base.node_text(&value));
                                break;
                            }
                        }
                    }
                    "implements_clause" => {
                        let mut cc = clause.walk();
                        for ty in clause.named_children(&mut cc) {
                            let name = self.base.node_text(&ty);
                            // Drop generic arguments for the interface set
                            let name = name.split('<').next().unwrap_or(&name).to_string();
                            if !name.is_empty() {
                                class.interfaces.insert(name);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn collect_async(&self, node: &Node, symbol: &mut Symbol) {
        let mut cursor = node.walk();
        if node.children(&mut cursor).any(|c| c.kind() == "async") {
            symbol.modifiers.insert("async".to_string());
        }
    }

    fn has_function_value(&self, node: &Node) -> bool {
        node.child_by_field_name("value")
            .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::parse_source;

    const SAMPLE: &str = r#"
export interface IUserService {
  findById(id: string): Promise<User>;
}

export class UserService extends BaseService implements IUserService {
  private cache: Map<string, User>;

  async findById(id: string): Promise<User> {
    return this.cache.get(id);
  }
}

export type UserId = string;

export function createService(): UserService {
  return new UserService();
}

const toDisplayName = (user: User) => user.name;
"#;

    fn extract(source: &str) -> (Vec<Symbol>, Vec<Relationship>) {
        let tree = parse_source("typescript", source).unwrap();
        TypeScriptExtractor::new("src/user.ts".into(), source.into()).extract(&tree)
    }

    #[test]
    fn test_class_heritage() {
        let (symbols, _) = extract(SAMPLE);

        let class = symbols
            .iter()
            .find(|s| s.name == "UserService" && s.kind == SymbolKind::Class)
            .unwrap();
        assert_eq!(class.base_type.as_deref(), Some("BaseService"));
        assert!(class.interfaces.contains("IUserService"));

        let iface = symbols.iter().find(|s| s.name == "IUserService").unwrap();
        assert_eq!(iface.kind, SymbolKind::Interface);
    }

    #[test]
    fn test_members_and_functions() {
        let (symbols, relationships) = extract(SAMPLE);

        let class = symbols.iter().find(|s| s.name == "UserService").unwrap();
        let method = symbols
            .iter()
            .find(|s| s.name == "findById" && s.kind == SymbolKind::Method)
            .unwrap();
        assert_eq!(method.containing_symbol_id.as_ref(), Some(&class.id));
        assert!(method.modifiers.contains("async"));

        let field = symbols.iter().find(|s| s.name == "cache").unwrap();
        assert_eq!(field.kind, SymbolKind::Field);

        assert!(symbols
            .iter()
            .any(|s| s.name == "UserId" && s.kind == SymbolKind::TypeAlias));
        assert!(symbols
            .iter()
            .any(|s| s.name == "createService" && s.kind == SymbolKind::Function));
        assert!(symbols
            .iter()
            .any(|s| s.name == "toDisplayName" && s.kind == SymbolKind::Function));

        assert!(relationships
            .iter()
            .any(|r| r.kind == RelationshipKind::Contains && r.target_symbol_id == method.id));
    }
}

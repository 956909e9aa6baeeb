// Relationship traversal
//
// Relationships are adjacency rows, not owned pointers, so cycles are legal
// in the data. Traversal is bounded by depth and a visited set.

use super::SymbolStore;
use crate::error::EngineResult;
use crate::extractors::{Relationship, RelationshipKind};
use rusqlite::params;
use std::collections::{HashSet, VecDeque};

/// Which way to walk the graph from the start symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Edges pointing at the start symbol
    In,
    /// Edges leaving the start symbol
    Out,
    Both,
}

/// One edge discovered during traversal, with the depth it was found at
#[derive(Debug, Clone)]
pub struct RelationshipEdge {
    pub relationship: Relationship,
    pub depth: u32,
}

impl SymbolStore {
    /// Bounded breadth-first traversal from `symbol_id`.
    ///
    /// Cycles are broken on a visited set; `max_depth` of 1 returns only the
    /// immediate neighborhood.
    pub fn get_relationships(
        &self,
        symbol_id: &str,
        direction: TraversalDirection,
        max_depth: u32,
    ) -> EngineResult<Vec<RelationshipEdge>> {
        let mut edges = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();

        visited.insert(symbol_id.to_string());
        frontier.push_back((symbol_id.to_string(), 0));

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for rel in self.edges_touching(&current, direction)? {
                let next = if rel.source_symbol_id == current {
                    rel.target_symbol_id.clone()
                } else {
                    rel.source_symbol_id.clone()
                };

                edges.push(RelationshipEdge {
                    relationship: rel,
                    depth: depth + 1,
                });

                if visited.insert(next.clone()) {
                    frontier.push_back((next, depth + 1));
                }
            }
        }

        Ok(edges)
    }

    fn edges_touching(
        &self,
        symbol_id: &str,
        direction: TraversalDirection,
    ) -> EngineResult<Vec<Relationship>> {
        let sql = match direction {
            TraversalDirection::Out => {
                "SELECT source_symbol_id, target_symbol_id, kind, line, bidirectional
                 FROM relationships WHERE source_symbol_id = ?1
                 OR (bidirectional = 1 AND target_symbol_id = ?1)"
            }
            TraversalDirection::In => {
                "SELECT source_symbol_id, target_symbol_id, kind, line, bidirectional
                 FROM relationships WHERE target_symbol_id = ?1
                 OR (bidirectional = 1 AND source_symbol_id = ?1)"
            }
            TraversalDirection::Both => {
                "SELECT source_symbol_id, target_symbol_id, kind, line, bidirectional
                 FROM relationships WHERE source_symbol_id = ?1 OR target_symbol_id = ?1"
            }
        };

        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![symbol_id], |row| {
            let kind: String = row.get(2)?;
            Ok(Relationship {
                source_symbol_id: row.get(0)?,
                target_symbol_id: row.get(1)?,
                kind: RelationshipKind::parse(&kind),
                line: row.get(3)?,
                bidirectional: row.get::<_, i64>(4)? != 0,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::FileRecord;
    use crate::extractors::{symbol_id, Symbol, SymbolKind};
    use std::collections::BTreeSet;

    fn setup() -> (SymbolStore, String, String, String) {
        let mut store = SymbolStore::in_memory("ws").unwrap();

        let mk = |name: &str, line: u32| Symbol {
            id: symbol_id("g.rs", name, line, SymbolKind::Function),
            name: name.into(),
            kind: SymbolKind::Function,
            language: "rust".into(),
            file_path: "g.rs".into(),
            signature: String::new(),
            start_line: line,
            end_line: line,
            start_col: 0,
            end_col: 0,
            modifiers: BTreeSet::new(),
            base_type: None,
            interfaces: BTreeSet::new(),
            doc_comment: None,
            containing_symbol_id: None,
        };

        let a = mk("a", 1);
        let b = mk("b", 2);
        let c = mk("c", 3);

        let edge = |from: &Symbol, to: &Symbol| Relationship {
            source_symbol_id: from.id.clone(),
            target_symbol_id: to.id.clone(),
            kind: RelationshipKind::Calls,
            line: 1,
            bidirectional: false,
        };

        // a -> b -> c -> a (cycle)
        let rels = vec![edge(&a, &b), edge(&b, &c), edge(&c, &a)];

        let record = FileRecord {
            path: "g.rs".into(),
            language: "rust".into(),
            content_hash: "h".into(),
            size: 1,
            last_modified: 1,
            symbol_count: 3,
            workspace_id: "ws".into(),
        };
        let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());
        store.upsert_file(&record, &[a, b, c], &rels).unwrap();
        (store, a_id, b_id, c_id)
    }

    #[test]
    fn test_outbound_depth_one() {
        let (store, a, b, _) = setup();
        let edges = store
            .get_relationships(&a, TraversalDirection::Out, 1)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship.target_symbol_id, b);
        assert_eq!(edges[0].depth, 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let (store, a, _, _) = setup();
        // Depth larger than the cycle length must still terminate
        let edges = store
            .get_relationships(&a, TraversalDirection::Out, 10)
            .unwrap();
        // a->b (d1), b->c (d2), c->a (d3, a already visited so stops)
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.depth <= 3));
    }

    #[test]
    fn test_inbound_direction() {
        let (store, a, _, c) = setup();
        let edges = store
            .get_relationships(&a, TraversalDirection::In, 1)
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship.source_symbol_id, c);
    }

    #[test]
    fn test_both_directions() {
        let (store, _, b, _) = setup();
        let edges = store
            .get_relationships(&b, TraversalDirection::Both, 1)
            .unwrap();
        // a->b and b->c
        assert_eq!(edges.len(), 2);
    }
}

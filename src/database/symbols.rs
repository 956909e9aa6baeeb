// Symbol operations
//
// upsert_file is the store half of the dual-write pipeline: replacing a
// file's symbols is a single transaction, so no reader ever observes the
// old and new symbol sets mixed.

use super::{FileRecord, SymbolStore};
use crate::error::EngineResult;
use crate::extractors::{Relationship, Symbol, SymbolKind};
use rusqlite::{params, Row};
use std::collections::BTreeSet;
use tracing::debug;

const SYMBOL_COLUMNS: &str = "id, name, kind, language, file_path, signature, start_line, \
     end_line, start_col, end_col, modifiers, base_type, interfaces, doc_comment, \
     containing_symbol_id";

fn row_to_symbol(row: &Row) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(2)?;
    let modifiers: String = row.get(10)?;
    let interfaces: String = row.get(12)?;

    Ok(Symbol {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: SymbolKind::parse(&kind),
        language: row.get(3)?,
        file_path: row.get(4)?,
        signature: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
        start_col: row.get(8)?,
        end_col: row.get(9)?,
        modifiers: serde_json::from_str::<BTreeSet<String>>(&modifiers).unwrap_or_default(),
        base_type: row.get(11)?,
        interfaces: serde_json::from_str::<BTreeSet<String>>(&interfaces).unwrap_or_default(),
        doc_comment: row.get(13)?,
        containing_symbol_id: row.get(14)?,
    })
}

impl SymbolStore {
    /// Atomically replace a file's record, symbols, and relationships.
    ///
    /// Deletes everything previously stored for `record.path`, inserts the
    /// new rows, and commits as one transaction. Any failure rolls the whole
    /// file back.
    pub fn upsert_file(
        &mut self,
        record: &FileRecord,
        symbols: &[Symbol],
        relationships: &[Relationship],
    ) -> EngineResult<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "DELETE FROM relationships WHERE file_path = ?1",
            params![record.path],
        )?;
        tx.execute(
            "DELETE FROM symbols WHERE file_path = ?1",
            params![record.path],
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO files
             (path, language, content_hash, size, last_modified, symbol_count, workspace_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.path,
                record.language,
                record.content_hash,
                record.size,
                record.last_modified,
                symbols.len() as i64,
                record.workspace_id,
            ],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO symbols ({SYMBOL_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ))?;

            for symbol in symbols {
                stmt.execute(params![
                    symbol.id,
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.language,
                    symbol.file_path,
                    symbol.signature,
                    symbol.start_line,
                    symbol.end_line,
                    symbol.start_col,
                    symbol.end_col,
                    serde_json::to_string(&symbol.modifiers).unwrap_or_else(|_| "[]".into()),
                    symbol.base_type,
                    serde_json::to_string(&symbol.interfaces).unwrap_or_else(|_| "[]".into()),
                    symbol.doc_comment,
                    symbol.containing_symbol_id,
                ])?;
            }

            let mut rel_stmt = tx.prepare(
                "INSERT OR REPLACE INTO relationships
                 (source_symbol_id, target_symbol_id, kind, line, bidirectional, file_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for rel in relationships {
                rel_stmt.execute(params![
                    rel.source_symbol_id,
                    rel.target_symbol_id,
                    rel.kind.as_str(),
                    rel.line,
                    rel.bidirectional as i64,
                    record.path,
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "Upserted {} with {} symbols, {} relationships",
            record.path,
            symbols.len(),
            relationships.len()
        );
        Ok(())
    }

    /// Exact-match symbol lookup by name, workspace scoped
    pub fn get_symbols_by_name(&self, name: &str) -> EngineResult<Vec<Symbol>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 ORDER BY file_path, start_line"
        ))?;
        let rows = stmt.query_map(params![name], row_to_symbol)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_symbols_for_file(&self, path: &str) -> EngineResult<Vec<Symbol>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE file_path = ?1 ORDER BY start_line"
        ))?;
        let rows = stmt.query_map(params![path], row_to_symbol)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_symbol_by_id(&self, id: &str) -> EngineResult<Option<Symbol>> {
        use rusqlite::OptionalExtension;
        let symbol = self
            .conn()
            .query_row(
                &format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE id = ?1"),
                params![id],
                row_to_symbol,
            )
            .optional()?;
        Ok(symbol)
    }

    /// Exact lookup with kind and language filters applied in SQL
    pub fn query_symbols(
        &self,
        name: &str,
        kind: Option<SymbolKind>,
        language: Option<&str>,
        limit: usize,
    ) -> EngineResult<Vec<Symbol>> {
        let mut sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1");
        if kind.is_some() {
            sql.push_str(" AND kind = ?2");
        } else {
            sql.push_str(" AND ?2 = ?2");
        }
        if language.is_some() {
            sql.push_str(" AND language = ?3");
        } else {
            sql.push_str(" AND ?3 = ?3");
        }
        sql.push_str(" ORDER BY file_path, start_line LIMIT ?4");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                name,
                kind.map(|k| k.as_str()).unwrap_or("any"),
                language.unwrap_or("any"),
                limit as i64,
            ],
            row_to_symbol,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

}

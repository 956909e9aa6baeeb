// File record operations

use super::SymbolStore;
use crate::error::EngineResult;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// One tracked source file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub language: String,
    /// 32-byte content hash, hex encoded
    pub content_hash: String,
    pub size: i64,
    /// Milliseconds since the epoch
    pub last_modified: i64,
    pub symbol_count: i64,
    pub workspace_id: String,
}

fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        language: row.get(1)?,
        content_hash: row.get(2)?,
        size: row.get(3)?,
        last_modified: row.get(4)?,
        symbol_count: row.get(5)?,
        workspace_id: row.get(6)?,
    })
}

const FILE_COLUMNS: &str =
    "path, language, content_hash, size, last_modified, symbol_count, workspace_id";

impl SymbolStore {
    pub fn get_file(&self, path: &str) -> EngineResult<Option<FileRecord>> {
        let record = self
            .conn()
            .query_row(
                &format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"),
                params![path],
                row_to_file,
            )
            .optional()?;
        Ok(record)
    }

    /// Stored content hash for a path; the ingest pipeline's no-op check
    pub fn get_file_hash(&self, path: &str) -> EngineResult<Option<String>> {
        let hash = self
            .conn()
            .query_row(
                "SELECT content_hash FROM files WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn list_files(&self) -> EngineResult<Vec<FileRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY path"))?;
        let rows = stmt.query_map([], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Paths whose file records changed at or after `since_ms`, for warm
    /// restart reconciliation
    pub fn scan_changed_since(&self, since_ms: i64) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT path FROM files WHERE last_modified >= ?1 ORDER BY last_modified",
        )?;
        let rows = stmt.query_map(params![since_ms], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Files modified within the window, newest first, bounded by limit
    pub fn recent_files(&self, since_ms: i64, limit: usize) -> EngineResult<Vec<FileRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE last_modified >= ?1
             ORDER BY last_modified DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![since_ms, limit as i64], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Cascade delete of a file, its symbols, and its relationships in one
    /// transaction. Idempotent: deleting an unknown path is a no-op.
    pub fn delete_file(&mut self, path: &str) -> EngineResult<bool> {
        let tx = self.conn_mut().transaction()?;
        // Foreign keys cascade symbols and relationships
        let deleted = tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SymbolStore;
    use crate::extractors::{symbol_id, Symbol, SymbolKind};
    use std::collections::BTreeSet;

    fn sample_file(path: &str, hash: &str, modified: i64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: "rust".to_string(),
            content_hash: hash.to_string(),
            size: 100,
            last_modified: modified,
            symbol_count: 1,
            workspace_id: "ws1".to_string(),
        }
    }

    fn sample_symbol(path: &str, name: &str) -> Symbol {
        Symbol {
            id: symbol_id(path, name, 1, SymbolKind::Function),
            name: name.to_string(),
            kind: SymbolKind::Function,
            language: "rust".to_string(),
            file_path: path.to_string(),
            signature: format!("fn {name}()"),
            start_line: 1,
            end_line: 3,
            start_col: 0,
            end_col: 1,
            modifiers: BTreeSet::new(),
            base_type: None,
            interfaces: BTreeSet::new(),
            doc_comment: None,
            containing_symbol_id: None,
        }
    }

    #[test]
    fn test_file_round_trip() {
        let mut store = SymbolStore::in_memory("ws1").unwrap();
        let record = sample_file("src/a.rs", "abc", 1_000);

        store.upsert_file(&record, &[sample_symbol("src/a.rs", "alpha")], &[]).unwrap();

        let loaded = store.get_file("src/a.rs").unwrap().unwrap();
        assert_eq!(loaded.content_hash, "abc");
        assert_eq!(store.get_file_hash("src/a.rs").unwrap().unwrap(), "abc");
        assert!(store.get_file("src/missing.rs").unwrap().is_none());
    }

    #[test]
    fn test_scan_changed_since() {
        let mut store = SymbolStore::in_memory("ws1").unwrap();
        store.upsert_file(&sample_file("src/old.rs", "h1", 1_000), &[], &[]).unwrap();
        store.upsert_file(&sample_file("src/new.rs", "h2", 9_000), &[], &[]).unwrap();

        let changed = store.scan_changed_since(5_000).unwrap();
        assert_eq!(changed, vec!["src/new.rs".to_string()]);
    }

    #[test]
    fn test_delete_cascades_symbols() {
        let mut store = SymbolStore::in_memory("ws1").unwrap();
        store
            .upsert_file(
                &sample_file("src/a.rs", "h", 1_000),
                &[sample_symbol("src/a.rs", "alpha")],
                &[],
            )
            .unwrap();
        assert_eq!(store.counts().unwrap(), (1, 1, 0));

        assert!(store.delete_file("src/a.rs").unwrap());
        assert_eq!(store.counts().unwrap(), (0, 0, 0));

        // Idempotent
        assert!(!store.delete_file("src/a.rs").unwrap());
    }

    #[test]
    fn test_recent_files_ordering() {
        let mut store = SymbolStore::in_memory("ws1").unwrap();
        store.upsert_file(&sample_file("a.rs", "1", 100), &[], &[]).unwrap();
        store.upsert_file(&sample_file("b.rs", "2", 300), &[], &[]).unwrap();
        store.upsert_file(&sample_file("c.rs", "3", 200), &[], &[]).unwrap();

        let recent = store.recent_files(150, 10).unwrap();
        let paths: Vec<_> = recent.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["b.rs", "c.rs"]);
    }
}

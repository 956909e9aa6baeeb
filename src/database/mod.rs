// Canonical symbol store
//
// SQLite-backed durable store of files, symbols, and relationships. This is
// the source of truth the inverted index is rebuilt from after a crash.
// WAL mode keeps readers unblocked while the single writer commits.

mod files;
mod relationships;
mod schema;
mod symbols;

pub use files::FileRecord;
pub use relationships::{RelationshipEdge, TraversalDirection};

use crate::error::{EngineError, EngineResult};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub struct SymbolStore {
    conn: Connection,
    workspace_id: String,
}

impl SymbolStore {
    /// Open or create the store at `db_path`. Idempotent: the schema is
    /// created if missing and verified if present.
    pub fn open(db_path: &Path, workspace_id: &str) -> EngineResult<Self> {
        let conn = Connection::open(db_path)?;

        // WAL must be active before any schema work so readers can run
        // concurrently with the very first population pass.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let mut store = Self {
            conn,
            workspace_id: workspace_id.to_string(),
        };
        store.initialize_schema()?;
        store.verify_schema_version()?;

        info!(
            "Symbol store open at {} (workspace {})",
            db_path.display(),
            workspace_id
        );
        Ok(store)
    }

    /// In-memory store for tests
    #[cfg(test)]
    pub fn in_memory(workspace_id: &str) -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let mut store = Self {
            conn,
            workspace_id: workspace_id.to_string(),
        };
        store.initialize_schema()?;
        store.verify_schema_version()?;
        Ok(store)
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn verify_schema_version(&self) -> EngineResult<()> {
        let found: i64 = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;

        if found == SCHEMA_VERSION {
            return Ok(());
        }
        if found < SCHEMA_VERSION {
            // Forward migrations land here version by version. None exist
            // yet, so an older store is rebuilt rather than migrated.
            debug!("Store schema {} older than engine {}", found, SCHEMA_VERSION);
            return Err(EngineError::IncompatibleStore {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        Err(EngineError::IncompatibleStore {
            found,
            expected: SCHEMA_VERSION,
        })
    }

    /// Total counts for health reporting: (files, symbols, relationships)
    pub fn counts(&self) -> EngineResult<(u64, u64, u64)> {
        let files: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let symbols: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let relationships: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok((files, symbols, relationships))
    }

    /// Per-language file counts for diagnostics
    pub fn files_by_language(&self) -> EngineResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT language, COUNT(*) FROM files GROUP BY language ORDER BY 2 DESC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
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

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite");

        let store = SymbolStore::open(&path, "ws1").unwrap();
        drop(store);
        let store = SymbolStore::open(&path, "ws1").unwrap();
        assert_eq!(store.counts().unwrap(), (0, 0, 0));
    }

    #[test]
    fn test_schema_version_mismatch_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("store.sqlite");

        {
            let store = SymbolStore::open(&path, "ws1").unwrap();
            store
                .conn()
                .execute(
                    "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
                    [SCHEMA_VERSION + 10],
                )
                .unwrap();
        }

        let err = SymbolStore::open(&path, "ws1").unwrap_err();
        assert_eq!(err.code(), "incompatible-store");
        assert!(err.is_fatal());
    }
}

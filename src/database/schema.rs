// Store schema initialization

use super::{SymbolStore, SCHEMA_VERSION};
use crate::error::EngineResult;
use tracing::debug;

impl SymbolStore {
    /// Create all tables and indexes idempotently
    pub(super) fn initialize_schema(&mut self) -> EngineResult<()> {
        debug!("Creating symbol store schema");

        self.create_meta_table()?;
        self.create_files_table()?;
        self.create_symbols_table()?;
        self.create_relationships_table()?;

        Ok(())
    }

    fn create_meta_table(&self) -> EngineResult<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )?;
        self.conn().execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn create_files_table(&self) -> EngineResult<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                language TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                size INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                symbol_count INTEGER NOT NULL DEFAULT 0,
                workspace_id TEXT NOT NULL
            )",
            [],
        )?;

        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_files_language ON files(language)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_files_modified ON files(last_modified)",
            [],
        )?;

        debug!("Created files table and indexes");
        Ok(())
    }

    fn create_symbols_table(&self) -> EngineResult<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS symbols (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                language TEXT NOT NULL,
                file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                signature TEXT NOT NULL DEFAULT '',
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                start_col INTEGER NOT NULL,
                end_col INTEGER NOT NULL,
                modifiers TEXT NOT NULL DEFAULT '[]',      -- JSON array
                base_type TEXT,
                interfaces TEXT NOT NULL DEFAULT '[]',     -- JSON array
                doc_comment TEXT,
                containing_symbol_id TEXT
            )",
            [],
        )?;

        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_symbols_containing ON symbols(containing_symbol_id)",
            [],
        )?;

        debug!("Created symbols table and indexes");
        Ok(())
    }

    fn create_relationships_table(&self) -> EngineResult<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS relationships (
                source_symbol_id TEXT NOT NULL,
                target_symbol_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                line INTEGER NOT NULL DEFAULT 0,
                bidirectional INTEGER NOT NULL DEFAULT 0,
                file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
                PRIMARY KEY (source_symbol_id, target_symbol_id, kind)
            )",
            [],
        )?;

        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_source ON relationships(source_symbol_id)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_target ON relationships(target_symbol_id)",
            [],
        )?;
        self.conn().execute(
            "CREATE INDEX IF NOT EXISTS idx_rel_file ON relationships(file_path)",
            [],
        )?;

        debug!("Created relationships table and indexes");
        Ok(())
    }
}

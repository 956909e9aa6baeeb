// Workspace path resolution
//
// PathResolver is the single source of truth for the on-disk layout of
// engine state. Nothing else in the crate joins path segments for state
// directories; components ask the resolver for a PathKind instead.
//
// Layout:
//   <workspace>/.quarry/
//     indexes/<workspace-id>/db/store.sqlite     symbol store
//     indexes/<workspace-id>/index/              inverted index segments
//     indexes/<workspace-id>/embeddings/         reserved
//     indexes/<workspace-id>/locks/writer.lock   single-writer lock
//     indexes/<workspace-id>/state/watcher.json  watcher cursor
//     logs/                                      engine logs
//     config/                                    quarry.toml
//     cache/                                     shared caches

use crate::error::{EngineError, EngineResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the engine state directory under the workspace root
pub const ENGINE_DIR_NAME: &str = ".quarry";

/// Kinds of on-disk locations the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// The `.quarry` directory itself
    Base,
    /// Tantivy segment directory
    InvertedIndexDir,
    /// SQLite database file
    SymbolStoreFile,
    /// Persisted watcher cursor
    WatcherStateFile,
    /// Shared cache directory
    CacheDir,
    /// Log directory
    LogsDir,
    /// Config directory
    ConfigDir,
    /// Writer lock file
    LockFile,
    /// Reserved for a future semantic index
    EmbeddingsDir,
}

/// Resolves and creates all engine state paths for one workspace
#[derive(Debug, Clone)]
pub struct PathResolver {
    workspace_root: PathBuf,
    base: PathBuf,
    workspace_id: String,
}

impl PathResolver {
    /// Create a resolver for a workspace root. `base_override` implements the
    /// `paths.base` config option; when absent the base is `<root>/.quarry`.
    pub fn new(workspace_root: &Path, base_override: Option<&Path>) -> EngineResult<Self> {
        let workspace_root = workspace_root
            .canonicalize()
            .map_err(|source| EngineError::Io {
                path: workspace_root.to_path_buf(),
                source,
            })?;

        let base = match base_override {
            Some(b) => b.to_path_buf(),
            None => workspace_root.join(ENGINE_DIR_NAME),
        };

        let workspace_id = workspace_id_for(&workspace_root);

        Ok(Self {
            workspace_root,
            base,
            workspace_id,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Stable identifier derived from the absolute workspace path
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Resolve a path kind, creating its directory on first request.
    /// Always returns an absolute path.
    pub fn resolve(&self, kind: PathKind) -> EngineResult<PathBuf> {
        let indexes = self.base.join("indexes").join(&self.workspace_id);

        let (dir, file) = match kind {
            PathKind::Base => (self.base.clone(), None),
            PathKind::InvertedIndexDir => (indexes.join("index"), None),
            PathKind::SymbolStoreFile => (indexes.join("db"), Some("store.sqlite")),
            PathKind::WatcherStateFile => (indexes.join("state"), Some("watcher.json")),
            PathKind::CacheDir => (self.base.join("cache"), None),
            PathKind::LogsDir => (self.base.join("logs"), None),
            PathKind::ConfigDir => (self.base.join("config"), None),
            PathKind::LockFile => (indexes.join("locks"), Some("writer.lock")),
            PathKind::EmbeddingsDir => (indexes.join("embeddings"), None),
        };

        fs::create_dir_all(&dir).map_err(|source| EngineError::Io {
            path: dir.clone(),
            source,
        })?;

        Ok(match file {
            Some(name) => dir.join(name),
            None => dir,
        })
    }

    /// Whether a path belongs to engine state that index-cleanup operations
    /// must never delete (the symbol store and everything outside the index
    /// segment directory).
    pub fn is_protected(&self, path: &Path) -> bool {
        let indexes = self.base.join("indexes").join(&self.workspace_id);
        let index_dir = indexes.join("index");

        path.starts_with(&self.base) && !path.starts_with(&index_dir)
    }

    /// Whether a path lives inside the engine state directory at all.
    /// The watcher uses this to keep the engine from indexing itself.
    pub fn is_engine_state(&self, path: &Path) -> bool {
        path.starts_with(&self.base)
    }

    /// Create the full folder hierarchy up front, plus a .gitignore so the
    /// state directory never lands in version control.
    pub fn create_layout(&self) -> EngineResult<()> {
        for kind in [
            PathKind::Base,
            PathKind::InvertedIndexDir,
            PathKind::SymbolStoreFile,
            PathKind::WatcherStateFile,
            PathKind::CacheDir,
            PathKind::LogsDir,
            PathKind::ConfigDir,
            PathKind::LockFile,
            PathKind::EmbeddingsDir,
        ] {
            self.resolve(kind)?;
        }

        let gitignore = self.base.join(".gitignore");
        if !gitignore.exists() {
            fs::write(
                &gitignore,
                "# Quarry engine state - do not commit\n*\n!.gitignore\n",
            )
            .map_err(|source| EngineError::Io {
                path: gitignore.clone(),
                source,
            })?;
        }

        debug!(
            "Created engine state layout for workspace {} at {}",
            self.workspace_id,
            self.base.display()
        );
        Ok(())
    }
}

/// Stable workspace id: first 16 hex chars of the blake3 hash of the
/// absolute path. Long enough to avoid collisions between checkouts,
/// short enough to stay readable in directory listings.
pub fn workspace_id_for(absolute_root: &Path) -> String {
    let hash = blake3::hash(absolute_root.to_string_lossy().as_bytes());
    hash.to_hex().as_str()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_id_stable_and_distinct() {
        let a = workspace_id_for(Path::new("/home/dev/project-a"));
        let b = workspace_id_for(Path::new("/home/dev/project-b"));
        let a2 = workspace_id_for(Path::new("/home/dev/project-a"));

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_resolve_creates_directories() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path(), None).unwrap();

        let store = resolver.resolve(PathKind::SymbolStoreFile).unwrap();
        assert!(store.is_absolute());
        assert!(store.parent().unwrap().exists());
        assert!(store.ends_with("db/store.sqlite"));

        let index = resolver.resolve(PathKind::InvertedIndexDir).unwrap();
        assert!(index.exists());

        // Second resolve is idempotent
        let index2 = resolver.resolve(PathKind::InvertedIndexDir).unwrap();
        assert_eq!(index, index2);
    }

    #[test]
    fn test_protected_paths() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path(), None).unwrap();
        resolver.create_layout().unwrap();

        let store = resolver.resolve(PathKind::SymbolStoreFile).unwrap();
        let index = resolver.resolve(PathKind::InvertedIndexDir).unwrap();

        assert!(resolver.is_protected(&store));
        assert!(!resolver.is_protected(&index.join("segment.idx")));
        assert!(!resolver.is_protected(&dir.path().join("src/main.rs")));
    }

    #[test]
    fn test_base_override() {
        let workspace = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let resolver =
            PathResolver::new(workspace.path(), Some(&elsewhere.path().join("state"))).unwrap();

        let logs = resolver.resolve(PathKind::LogsDir).unwrap();
        assert!(logs.starts_with(elsewhere.path()));
    }

    #[test]
    fn test_engine_state_detection() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path(), None).unwrap();
        let base = resolver.resolve(PathKind::Base).unwrap();

        assert!(resolver.is_engine_state(&base.join("index/seg.idx")));
        assert!(!resolver.is_engine_state(&dir.path().join("src/lib.rs")));
    }
}

// Engine error taxonomy
//
// Every caller-visible failure maps onto one of these variants. Each variant
// carries a stable machine-readable code and, where recovery is possible,
// concrete next actions a caller can take.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected input: unknown option, malformed query for a strict parser
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    /// Path, symbol, or handle not present
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Detail handle references a snapshot that no longer exists
    #[error("Detail handle {handle:#018x} is stale; the snapshot it references has been released")]
    StaleDetail { handle: u64 },

    /// Engine under memory or queue pressure
    #[error("Engine is under {kind} pressure; retry with a smaller request")]
    Backpressure { kind: PressureKind },

    /// A per-branch or request deadline fired
    #[error("Deadline of {deadline_ms}ms exceeded in {tier}")]
    DeadlineExceeded { tier: String, deadline_ms: u64 },

    /// Non-fatal ingest failure; the file is quarantined and the pipeline continues
    #[error("Failed to ingest '{path}': {cause}")]
    IngestFailed { path: PathBuf, cause: String },

    /// Underlying storage fault
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schema mismatch on store open; fatal unless migration succeeds
    #[error("Symbol store schema version {found} is incompatible (engine expects {expected})")]
    IncompatibleStore { found: i64, expected: i64 },

    /// Normal cooperative cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Writer lock is held by a live process
    #[error("Writer lock is held by pid {pid} (started {started_at}); not stale yet")]
    LockHeld { pid: u32, started_at: i64 },

    /// Symbol store fault that is not a plain I/O error
    #[error("Symbol store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Inverted index fault
    #[error("Search index error: {0}")]
    Index(#[from] tantivy::TantivyError),
}

/// What kind of pressure triggered a backpressure rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureKind {
    Memory,
    Queue,
}

impl std::fmt::Display for PressureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

impl EngineError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation-error",
            Self::NotFound { .. } => "not-found",
            Self::StaleDetail { .. } => "stale-detail",
            Self::Backpressure { .. } => "backpressure",
            Self::DeadlineExceeded { .. } => "deadline-exceeded",
            Self::IngestFailed { .. } => "ingest-failed",
            Self::Io { .. } => "io-error",
            Self::IncompatibleStore { .. } => "incompatible-store",
            Self::Cancelled => "cancelled",
            Self::LockHeld { .. } => "io-error",
            Self::Store(_) => "io-error",
            Self::Index(_) => "io-error",
        }
    }

    /// Concrete next actions for the caller, empty when none apply
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::StaleDetail { .. } => vec![
                "Re-issue the original search; the result set has changed underneath the handle",
            ],
            Self::Backpressure { .. } => vec![
                "Retry with a smaller max_results or a lower token budget",
                "Wait for the pending ingest queue to drain (see system_health)",
            ],
            Self::DeadlineExceeded { .. } => vec![
                "Partial results from the other tiers may still be present",
                "Raise search.default_deadline_ms if this recurs on cold caches",
            ],
            Self::IngestFailed { .. } => vec![
                "The file has been quarantined; fix it or add it to watcher.ignore_patterns",
                "Run index_workspace with force_rebuild to retry quarantined files",
            ],
            Self::IncompatibleStore { .. } => vec![
                "Delete the workspace state directory and re-run index_workspace",
            ],
            Self::LockHeld { .. } => vec![
                "Another engine instance owns this workspace; stop it or wait for lock.staleness_ms",
            ],
            Self::Validation { .. } => vec!["Check the request against the operation's schema"],
            Self::NotFound { .. } => vec!["Verify the workspace has been indexed"],
            _ => vec![],
        }
    }

    /// Whether the engine keeps serving after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IncompatibleStore { .. } | Self::LockHeld { .. })
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = EngineError::Validation {
            reason: "bad".into(),
        };
        assert_eq!(err.code(), "validation-error");

        let err = EngineError::StaleDetail { handle: 42 };
        assert_eq!(err.code(), "stale-detail");
        assert!(!err.recovery_hints().is_empty());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::IncompatibleStore {
            found: 1,
            expected: 2
        }
        .is_fatal());
        assert!(!EngineError::Cancelled.is_fatal());
        assert!(!EngineError::Backpressure {
            kind: PressureKind::Memory
        }
        .is_fatal());
    }
}

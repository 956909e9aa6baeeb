// Single-writer lock
//
// One engine instance owns the write side of a workspace at a time. The lock
// is a JSON file holding the owner's pid and start time; a lock whose file is
// older than the configured staleness threshold is assumed to belong to a
// dead process and is reclaimed.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    started_at_ms: i64,
}

/// Held writer lock. Dropping it releases the lock file.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    released: bool,
}

impl WriterLock {
    /// Acquire the writer lock, reclaiming a stale one if its file has not
    /// been touched within `staleness_ms`.
    pub fn acquire(lock_path: &Path, staleness_ms: u64) -> EngineResult<Self> {
        if lock_path.exists() {
            let age_ms = lock_file_age_ms(lock_path)?;

            if age_ms < staleness_ms {
                match read_payload(lock_path) {
                    // Our own leftover from an earlier acquire in this
                    // process; safe to take over.
                    Some(p) if p.pid == std::process::id() => {
                        return Self::write_and_hold(lock_path);
                    }
                    Some(p) => {
                        return Err(EngineError::LockHeld {
                            pid: p.pid,
                            started_at: p.started_at_ms,
                        });
                    }
                    None => {
                        return Err(EngineError::LockHeld {
                            pid: 0,
                            started_at: 0,
                        });
                    }
                }
            }

            warn!(
                "Reclaiming stale writer lock at {} (age {}ms >= {}ms)",
                lock_path.display(),
                age_ms,
                staleness_ms
            );
            fs::remove_file(lock_path).map_err(|source| EngineError::Io {
                path: lock_path.to_path_buf(),
                source,
            })?;
        }

        Self::write_and_hold(lock_path)
    }

    fn write_and_hold(lock_path: &Path) -> EngineResult<Self> {
        let payload = LockPayload {
            pid: std::process::id(),
            started_at_ms: now_ms(),
        };
        let content = serde_json::to_string(&payload).map_err(|e| EngineError::Validation {
            reason: format!("failed to serialize lock payload: {e}"),
        })?;

        fs::write(lock_path, content).map_err(|source| EngineError::Io {
            path: lock_path.to_path_buf(),
            source,
        })?;

        info!("Acquired writer lock at {}", lock_path.display());
        Ok(Self {
            path: lock_path.to_path_buf(),
            released: false,
        })
    }

    /// Touch the lock file so long-running sessions are never mistaken for
    /// stale ones.
    pub fn refresh(&self) -> EngineResult<()> {
        let payload = LockPayload {
            pid: std::process::id(),
            started_at_ms: now_ms(),
        };
        let content = serde_json::to_string(&payload).map_err(|e| EngineError::Validation {
            reason: format!("failed to serialize lock payload: {e}"),
        })?;
        fs::write(&self.path, content).map_err(|source| EngineError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Release explicitly; also happens on drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(
                    "Failed to remove writer lock {}: {}",
                    self.path.display(),
                    e
                );
            }
            self.released = true;
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn read_payload(path: &Path) -> Option<LockPayload> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn lock_file_age_ms(path: &Path) -> EngineResult<u64> {
    let meta = fs::metadata(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let modified = meta.modified().map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(modified
        .elapsed()
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// File watcher
//
// Subscribes to filesystem events under the workspace root, coalesces them
// per path, and drives the ingest pipeline. Renames split into
// delete(old) + create(new). The pending queue is bounded: when it fills,
// redundant modify events are dropped; creates and deletes never are.

mod debounce;
mod filtering;

pub use debounce::Debouncer;
pub use filtering::IgnoreRules;

use crate::error::EngineResult;
use crate::indexing::IngestPipeline;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kind of coalesced change delivered to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// Persisted watcher position, written on clean shutdown. A missing or
/// unreadable cursor just means the next start reconciles from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WatcherCursor {
    pub last_clean_shutdown_ms: i64,
}

impl WatcherCursor {
    pub fn load(path: &std::path::Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn save(&self, path: &std::path::Path) -> crate::error::EngineResult<()> {
        let content =
            serde_json::to_string(self).map_err(|e| crate::error::EngineError::Validation {
                reason: format!("failed to serialize watcher cursor: {e}"),
            })?;
        std::fs::write(path, content).map_err(|source| crate::error::EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One coalesced filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Bounded pending-event queue with the drop policy from the backpressure
/// contract: a full queue sheds redundant modify events only.
#[derive(Debug)]
pub struct EventQueue {
    queue: VecDeque<ChangeEvent>,
    cap: usize,
    dropped_modifies: u64,
}

impl EventQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            cap: cap.max(1),
            dropped_modifies: 0,
        }
    }

    pub fn push(&mut self, event: ChangeEvent) {
        // A newer event for the same path supersedes a queued modify
        if event.kind != ChangeKind::Delete {
            if let Some(existing) = self
                .queue
                .iter()
                .position(|e| e.path == event.path && e.kind == ChangeKind::Modify)
            {
                self.queue.remove(existing);
                self.dropped_modifies += 1;
            }
        }

        if self.queue.len() >= self.cap {
            // Shed the oldest modify; creates and deletes are never dropped
            if let Some(oldest_modify) = self
                .queue
                .iter()
                .position(|e| e.kind == ChangeKind::Modify)
            {
                self.queue.remove(oldest_modify);
                self.dropped_modifies += 1;
            } else if event.kind == ChangeKind::Modify {
                self.dropped_modifies += 1;
                return;
            }
            // Queue full of creates/deletes: exceed the cap rather than
            // lose a non-droppable event
        }

        self.queue.push_back(event);
    }

    pub fn pop(&mut self) -> Option<ChangeEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped_modifies(&self) -> u64 {
        self.dropped_modifies
    }
}

pub struct FileWatcher {
    root: PathBuf,
    ignore: Arc<IgnoreRules>,
    debounce_ms: u64,
    queue: Arc<Mutex<EventQueue>>,
    watcher: Option<notify::RecommendedWatcher>,
}

impl FileWatcher {
    pub fn new(root: PathBuf, ignore: Arc<IgnoreRules>, debounce_ms: u64, queue_cap: usize) -> Self {
        Self {
            root,
            ignore,
            debounce_ms,
            queue: Arc::new(Mutex::new(EventQueue::new(queue_cap))),
            watcher: None,
        }
    }

    /// Feed synthetic events (cold-start reconciliation) into the queue
    pub fn enqueue_all(&self, events: Vec<ChangeEvent>) {
        if let Ok(mut queue) = self.queue.lock() {
            for event in events {
                queue.push(event);
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Start watching and drive the pipeline until cancelled.
    ///
    /// Three loops: the notify callback feeding a channel, a coalescer
    /// moving debounced events into the bounded queue, and a consumer
    /// running ingests.
    pub fn start(
        &mut self,
        pipeline: Arc<IngestPipeline>,
        cancel: CancellationToken,
    ) -> EngineResult<()> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            if raw_tx.send(res).is_err() {
                // Receiver gone; the engine is shutting down
            }
        })
        .map_err(|e| crate::error::EngineError::IngestFailed {
            path: self.root.clone(),
            cause: format!("failed to create watcher: {e}"),
        })?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| crate::error::EngineError::IngestFailed {
                path: self.root.clone(),
                cause: format!("failed to watch workspace: {e}"),
            })?;
        self.watcher = Some(watcher);
        info!("Watching {} for changes", self.root.display());

        tokio::spawn(Self::coalesce_loop(
            raw_rx,
            Arc::clone(&self.ignore),
            Arc::clone(&self.queue),
            self.debounce_ms,
            cancel.clone(),
        ));
        tokio::spawn(Self::consume_loop(
            Arc::clone(&self.queue),
            pipeline,
            cancel,
        ));

        Ok(())
    }

    async fn coalesce_loop(
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        ignore: Arc<IgnoreRules>,
        queue: Arc<Mutex<EventQueue>>,
        debounce_ms: u64,
        cancel: CancellationToken,
    ) {
        let mut debouncer = Debouncer::new(debounce_ms);
        let mut tick = tokio::time::interval(Duration::from_millis((debounce_ms / 2).max(10)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Watcher coalescer stopping");
                    return;
                }
                _ = tick.tick() => {
                    let ready = debouncer.take_ready();
                    if !ready.is_empty() {
                        if let Ok(mut queue) = queue.lock() {
                            for path in ready {
                                queue.push(ChangeEvent { path, kind: ChangeKind::Modify });
                            }
                        }
                    }
                }
                event = raw_rx.recv() => {
                    let Some(event) = event else { return };
                    match event {
                        Ok(event) => {
                            Self::absorb_event(event, &ignore, &mut debouncer, &queue);
                        }
                        Err(e) => warn!("Watcher error: {}", e),
                    }
                }
            }
        }
    }

    fn absorb_event(
        event: Event,
        ignore: &IgnoreRules,
        debouncer: &mut Debouncer,
        queue: &Arc<Mutex<EventQueue>>,
    ) {
        let paths: Vec<PathBuf> = event
            .paths
            .iter()
            .filter(|p| !ignore.is_ignored(p))
            .cloned()
            .collect();
        if paths.is_empty() {
            return;
        }

        match event.kind {
            EventKind::Create(_) => {
                if let Ok(mut queue) = queue.lock() {
                    for path in paths {
                        debouncer.remove(&path);
                        queue.push(ChangeEvent {
                            path,
                            kind: ChangeKind::Create,
                        });
                    }
                }
            }
            EventKind::Remove(_) => {
                if let Ok(mut queue) = queue.lock() {
                    for path in paths {
                        debouncer.remove(&path);
                        queue.push(ChangeEvent {
                            path,
                            kind: ChangeKind::Delete,
                        });
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                // Renames split into delete(old) + create(new)
                if let Ok(mut queue) = queue.lock() {
                    match (mode, paths.as_slice()) {
                        (RenameMode::Both, [old, new]) => {
                            debouncer.remove(old);
                            queue.push(ChangeEvent {
                                path: old.clone(),
                                kind: ChangeKind::Delete,
                            });
                            queue.push(ChangeEvent {
                                path: new.clone(),
                                kind: ChangeKind::Create,
                            });
                        }
                        (RenameMode::From, paths) => {
                            for path in paths {
                                debouncer.remove(path);
                                queue.push(ChangeEvent {
                                    path: path.clone(),
                                    kind: ChangeKind::Delete,
                                });
                            }
                        }
                        (_, paths) => {
                            for path in paths {
                                queue.push(ChangeEvent {
                                    path: path.clone(),
                                    kind: ChangeKind::Create,
                                });
                            }
                        }
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in paths {
                    debouncer.record(path);
                }
            }
            _ => {}
        }
    }

    async fn consume_loop(
        queue: Arc<Mutex<EventQueue>>,
        pipeline: Arc<IngestPipeline>,
        cancel: CancellationToken,
    ) {
        let mut idle = tokio::time::interval(Duration::from_millis(25));

        loop {
            if cancel.is_cancelled() {
                debug!("Watcher consumer stopping");
                return;
            }

            let next = queue.lock().ok().and_then(|mut q| q.pop());
            let Some(event) = next else {
                // Nothing queued: let the elapsed commit bound fire
                if let Err(e) = pipeline.tick().await {
                    warn!("Commit tick failed: {}", e);
                }
                idle.tick().await;
                continue;
            };

            if event.kind != ChangeKind::Delete && !pipeline.ready_for_retry(&event.path) {
                // Backoff window still open; requeue behind everything else
                if let Ok(mut q) = queue.lock() {
                    q.push(event);
                }
                idle.tick().await;
                continue;
            }

            let outcome = match event.kind {
                ChangeKind::Create | ChangeKind::Modify => pipeline.ingest(&event.path).await,
                ChangeKind::Delete => pipeline.delete(&event.path).await,
            };

            if let Err(e) = outcome {
                // ingest-failed is quarantined inside the pipeline; anything
                // else is worth a louder log
                match e {
                    crate::error::EngineError::IngestFailed { ref path, ref cause } => {
                        debug!("Ingest failed for {}: {}", path.display(), cause);
                    }
                    other => error!("Watcher pipeline error: {}", other),
                }
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.root);
            info!("Stopped watching {}", self.root.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn test_queue_supersedes_stale_modify() {
        let mut queue = EventQueue::new(10);
        queue.push(event("/w/a.rs", ChangeKind::Modify));
        queue.push(event("/w/a.rs", ChangeKind::Modify));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped_modifies(), 1);
    }

    #[test]
    fn test_full_queue_sheds_modifies_first() {
        let mut queue = EventQueue::new(2);
        queue.push(event("/w/a.rs", ChangeKind::Modify));
        queue.push(event("/w/b.rs", ChangeKind::Create));
        queue.push(event("/w/c.rs", ChangeKind::Create));

        // The modify was shed; both creates survive
        let kinds: Vec<ChangeKind> = std::iter::from_fn(|| queue.pop()).map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Create, ChangeKind::Create]);
    }

    #[test]
    fn test_creates_and_deletes_never_dropped() {
        let mut queue = EventQueue::new(2);
        queue.push(event("/w/a.rs", ChangeKind::Create));
        queue.push(event("/w/b.rs", ChangeKind::Delete));
        queue.push(event("/w/c.rs", ChangeKind::Create));
        queue.push(event("/w/d.rs", ChangeKind::Delete));

        // Cap exceeded rather than losing any of them
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_incoming_modify_dropped_when_no_room() {
        let mut queue = EventQueue::new(1);
        queue.push(event("/w/a.rs", ChangeKind::Create));
        queue.push(event("/w/b.rs", ChangeKind::Modify));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().kind, ChangeKind::Create);
        assert_eq!(queue.dropped_modifies(), 1);
    }

    #[test]
    fn test_cursor_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("watcher.json");

        assert!(WatcherCursor::load(&path).is_none());

        let cursor = WatcherCursor {
            last_clean_shutdown_ms: 1_700_000_000_000,
        };
        cursor.save(&path).unwrap();
        assert_eq!(WatcherCursor::load(&path), Some(cursor));

        // Corrupt cursors are treated as absent, not as errors
        std::fs::write(&path, "not json").unwrap();
        assert!(WatcherCursor::load(&path).is_none());
    }

    #[tokio::test]
    async fn test_watch_ingest_cycle() {
        use crate::database::SymbolStore;
        use crate::search::SearchIndex;
        use std::fs;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let store = SymbolStore::in_memory("ws").unwrap();
        let index = Arc::new(SearchIndex::in_memory().unwrap());
        let pipeline = Arc::new(
            crate::indexing::build_pipeline_for_tests(store, Arc::clone(&index)).unwrap(),
        );

        let ignore = Arc::new(
            IgnoreRules::new(&[], dir.path().join(".quarry"), dir.path().to_path_buf()).unwrap(),
        );
        let mut watcher = FileWatcher::new(dir.path().to_path_buf(), ignore, 30, 128);
        let cancel = CancellationToken::new();
        watcher.start(Arc::clone(&pipeline), cancel.clone()).unwrap();

        fs::write(dir.path().join("watched.rs"), "pub struct Watched;").unwrap();

        // Wait out debounce + ingest
        let mut found = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            pipeline.flush().await.unwrap();
            if index.num_docs() == 1 {
                found = true;
                break;
            }
        }
        cancel.cancel();
        watcher.stop();

        assert!(found, "watcher never ingested the new file");
    }
}

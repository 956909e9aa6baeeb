// Startup reconciliation
//
// Two jobs after an unclean shutdown:
//  1. reconcile_index_with_store: the symbol store commits before the index,
//     so the store is the source of truth. Any store file whose document is
//     missing or carries a different hash gets its document rebuilt from
//     the stored symbols; index documents with no store row are deleted.
//  2. cold_start_events: diff the on-disk tree against the store and emit
//     synthetic change events; the hash short-circuit in the pipeline turns
//     spurious ones into no-ops.

use crate::database::SymbolStore;
use crate::error::EngineResult;
use crate::search::schema::FileDocument;
use crate::search::{IndexWriterHandle, SearchIndex};
use crate::watcher::{ChangeEvent, ChangeKind, IgnoreRules};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What reconciliation did, for startup logging and health
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub documents_rebuilt: usize,
    pub documents_deleted: usize,
    pub files_checked: usize,
}

/// Bring the inverted index back in line with the symbol store.
/// Runs before the watcher starts so no live writes interleave.
pub fn reconcile_index_with_store(
    store: &SymbolStore,
    index: &SearchIndex,
    writer: &mut IndexWriterHandle,
) -> EngineResult<ReconcileReport> {
    let mut report = ReconcileReport::default();
    let snapshot = index.snapshot();

    let files = store.list_files()?;
    let mut store_paths: HashSet<String> = HashSet::with_capacity(files.len());

    for file in &files {
        report.files_checked += 1;
        store_paths.insert(file.path.clone());

        let indexed_hash = index.stored_hash(&snapshot, &file.path)?;
        if indexed_hash.as_deref() == Some(file.content_hash.as_str()) {
            continue;
        }

        // Store is ahead of the index for this file: rebuild the document
        // from cached extraction output (the stored symbols), re-reading
        // content from disk when it still matches.
        let symbols = store.get_symbols_for_file(&file.path)?;
        let content = match std::fs::read(&file.path) {
            Ok(bytes)
                if crate::extractors::content_hash(&bytes) == file.content_hash =>
            {
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Ok(_) | Err(_) => {
                // Disk moved on or the file vanished; the cold-start walk
                // will emit the authoritative event. Index what we know.
                debug!(
                    "Rebuilding document for {} without fresh content",
                    file.path
                );
                String::new()
            }
        };

        let document = FileDocument {
            path: file.path.clone(),
            language: file.language.clone(),
            content,
            content_hash: file.content_hash.clone(),
            size: file.size,
            last_modified: file.last_modified,
            symbols,
        };
        writer.add_or_replace(&document)?;
        report.documents_rebuilt += 1;
    }

    // Index documents with no store row are leftovers from a torn delete
    for path in index.all_paths(&snapshot)? {
        if !store_paths.contains(&path) {
            writer.delete(&path)?;
            report.documents_deleted += 1;
        }
    }

    if report.documents_rebuilt > 0 || report.documents_deleted > 0 {
        writer.commit()?;
        index.refresh()?;
        info!(
            "Reconciled index with store: {} rebuilt, {} deleted, {} checked",
            report.documents_rebuilt, report.documents_deleted, report.files_checked
        );
    }

    Ok(report)
}

/// Walk the workspace and diff it against the store: create events for new
/// files, delete events for missing ones, modify events where (size, mtime)
/// differ.
pub fn cold_start_events(
    root: &Path,
    store: &SymbolStore,
    ignore: &IgnoreRules,
) -> EngineResult<Vec<ChangeEvent>> {
    let mut events = Vec::new();
    let mut on_disk: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cold-start walk error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        if ignore.is_ignored(&path) {
            continue;
        }
        on_disk.insert(path.clone());

        let path_str = path.to_string_lossy().into_owned();
        let known = store.get_file(&path_str)?;
        match known {
            None => events.push(ChangeEvent {
                path,
                kind: ChangeKind::Create,
            }),
            Some(record) => {
                let meta = entry.metadata().ok();
                let size = meta.as_ref().map(|m| m.len() as i64).unwrap_or(-1);
                let mtime = meta
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(-1);

                if size != record.size || mtime != record.last_modified {
                    events.push(ChangeEvent {
                        path,
                        kind: ChangeKind::Modify,
                    });
                }
            }
        }
    }

    // Store rows whose file vanished while the engine was down
    for record in store.list_files()? {
        let path = PathBuf::from(&record.path);
        if path.starts_with(root) && !on_disk.contains(&path) {
            events.push(ChangeEvent {
                path,
                kind: ChangeKind::Delete,
            });
        }
    }

    info!("Cold start produced {} reconciliation events", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::FileRecord;
    use crate::extractors::{symbol_id, Symbol, SymbolKind};
    use std::fs;
    use tempfile::TempDir;

    fn record(path: &str, hash: &str, size: i64, mtime: i64) -> FileRecord {
        FileRecord {
            path: path.into(),
            language: "rust".into(),
            content_hash: hash.into(),
            size,
            last_modified: mtime,
            symbol_count: 0,
            workspace_id: "ws".into(),
        }
    }

    #[test]
    fn test_store_ahead_of_index_rebuilds_document() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("foo.rs");
        let source = "pub fn foo_123() {}";
        fs::write(&file, source).unwrap();
        let path_str = file.to_string_lossy().into_owned();
        let hash = crate::extractors::content_hash(source.as_bytes());

        let mut store = SymbolStore::in_memory("ws").unwrap();
        let symbol = Symbol {
            id: symbol_id(&path_str, "foo_123", 1, SymbolKind::Function),
            name: "foo_123".into(),
            kind: SymbolKind::Function,
            language: "rust".into(),
            file_path: path_str.clone(),
            signature: "pub fn foo_123()".into(),
            start_line: 1,
            end_line: 1,
            start_col: 0,
            end_col: 0,
            modifiers: Default::default(),
            base_type: None,
            interfaces: Default::default(),
            doc_comment: None,
            containing_symbol_id: None,
        };
        store
            .upsert_file(&record(&path_str, &hash, source.len() as i64, 1), &[symbol], &[])
            .unwrap();

        // Simulated crash: store committed, index never saw the file
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();

        let report = reconcile_index_with_store(&store, &index, &mut writer).unwrap();
        assert_eq!(report.documents_rebuilt, 1);
        assert_eq!(report.documents_deleted, 0);

        // The rebuilt document is searchable
        let snapshot = index.snapshot();
        let hits = index
            .search_scored(
                &snapshot,
                "foo_123",
                crate::search::QueryMode::Standard,
                &Default::default(),
                10,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_orphan_document_deleted() {
        let store = SymbolStore::in_memory("ws").unwrap();
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();

        writer
            .add_or_replace(&FileDocument {
                path: "ghost.rs".into(),
                language: "rust".into(),
                content: "phantom".into(),
                content_hash: "h".into(),
                size: 7,
                last_modified: 1,
                symbols: vec![],
            })
            .unwrap();
        writer.commit().unwrap();
        index.refresh().unwrap();

        let report = reconcile_index_with_store(&store, &index, &mut writer).unwrap();
        assert_eq!(report.documents_deleted, 1);
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn test_in_sync_is_noop() {
        let store = SymbolStore::in_memory("ws").unwrap();
        let index = SearchIndex::in_memory().unwrap();
        let mut writer = index.writer(50_000_000).unwrap();

        let report = reconcile_index_with_store(&store, &index, &mut writer).unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[test]
    fn test_cold_start_diff() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("kept.rs");
        let fresh = dir.path().join("fresh.rs");
        fs::write(&kept, "kept").unwrap();
        fs::write(&fresh, "fresh").unwrap();

        let kept_meta = fs::metadata(&kept).unwrap();
        let kept_mtime = kept_meta
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;

        let mut store = SymbolStore::in_memory("ws").unwrap();
        // kept.rs matches disk exactly; vanished.rs is gone from disk
        store
            .upsert_file(
                &record(&kept.to_string_lossy(), "h", kept_meta.len() as i64, kept_mtime),
                &[],
                &[],
            )
            .unwrap();
        store
            .upsert_file(
                &record(&dir.path().join("vanished.rs").to_string_lossy(), "h", 1, 1),
                &[],
                &[],
            )
            .unwrap();

        let ignore =
            IgnoreRules::new(&[], dir.path().join(".quarry"), dir.path().to_path_buf()).unwrap();
        let mut events = cold_start_events(dir.path(), &store, &ignore).unwrap();
        events.sort_by_key(|e| e.path.clone());

        let kinds: Vec<(String, ChangeKind)> = events
            .iter()
            .map(|e| {
                (
                    e.path.file_name().unwrap().to_string_lossy().into_owned(),
                    e.kind,
                )
            })
            .collect();

        assert!(kinds.contains(&("fresh.rs".into(), ChangeKind::Create)));
        assert!(kinds.contains(&("vanished.rs".into(), ChangeKind::Delete)));
        assert!(!kinds.iter().any(|(name, _)| name == "kept.rs"));
    }
}

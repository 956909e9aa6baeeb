// Operation handlers
//
// Each handler is a typed async function over a validated request struct.
// Handlers translate between the request surface and the engine: planner
// for searches, store for exact symbol operations, shaper for budgets.

use super::requests::*;
use super::responses::OperationResponse;
use crate::database::TraversalDirection;
use crate::error::{EngineError, EngineResult};
use crate::search::{QueryMode, SearchFilters};
use crate::workspace::QuarryWorkspace;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub async fn index_workspace(
    engine: Arc<QuarryWorkspace>,
    request: IndexWorkspaceRequest,
) -> EngineResult<OperationResponse> {
    let report = engine.index_workspace(request.force_rebuild).await?;
    let health = engine.health_snapshot()?;

    Ok(OperationResponse::ok(json!({
        "files_indexed": report.files_indexed,
        "files_unchanged": report.files_unchanged,
        "files_failed": report.files_failed,
        "symbols": health.store_symbols,
        "relationships": health.store_relationships,
        "index_size_bytes": report.index_size_bytes,
        "duration_ms": report.duration_ms,
    })))
}

pub async fn text_search(
    engine: Arc<QuarryWorkspace>,
    request: TextSearchRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let mut options = engine.plan_options();
    options.mode = QueryMode::from(request.search_type);
    options.limit = request.max_results;
    options.collect_facets = true;
    options.filters = SearchFilters {
        extensions: request.extensions.clone(),
        path_glob: request.file_pattern.clone(),
        ..Default::default()
    };

    let shaped = engine
        .search(
            &request.query,
            options,
            request.token_budget,
            request.response_mode,
        )
        .await?;

    let mode = shaped.mode;
    let auto_switched = shaped.auto_switched;
    let detail_handle = shaped.detail_handle;

    Ok(
        OperationResponse::ok(serde_json::to_value(&shaped).unwrap_or_default())
            .with_mode(mode, auto_switched)
            .with_detail_handle(detail_handle),
    )
}

pub async fn symbol_search(
    engine: Arc<QuarryWorkspace>,
    request: SymbolSearchRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let mut options = engine.plan_options();
    options.limit = request.limit;
    options.kind_filter = request.kind_filter();
    options.language_filter = request.language.clone();

    let composite = engine.search_composite(&request.query, options).await?;

    let hits: Vec<serde_json::Value> = composite
        .hits
        .iter()
        .map(|hit| {
            json!({
                "path": hit.path,
                "tier": hit.tier,
                "score": hit.score,
                "start_line": hit.start_line,
                "symbols": hit.symbols.iter().map(|s| json!({
                    "id": s.id,
                    "name": s.name,
                    "kind": s.kind,
                    "signature": s.signature,
                    "start_line": s.start_line,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    Ok(OperationResponse::ok(json!({
        "query": composite.query,
        "hits": hits,
        "tiers": composite.tiers.iter().map(|t| json!({
            "tier": t.tier.to_string(),
            "hits": t.hits,
            "elapsed_ms": t.elapsed_ms,
            "error": t.error,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn file_search(
    engine: Arc<QuarryWorkspace>,
    request: FileSearchRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let snapshot = engine.index.snapshot();
    let distance = match request.search_type {
        SearchType::Fuzzy => 2,
        _ => 0,
    };

    let mut hits =
        engine
            .index
            .fuzzy_filename_search(&snapshot, &request.query, distance, request.max_results)?;

    // Few results on an exact pass: retry with fuzzy correction and
    // surface the corrected names as suggestions
    let mut suggestions: Vec<String> = Vec::new();
    if hits.len() < 3 && distance == 0 {
        let corrected = engine.index.fuzzy_filename_search(
            &snapshot,
            &request.query,
            2,
            request.max_results,
        )?;
        for hit in &corrected {
            let filename = std::path::Path::new(&hit.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !suggestions.contains(&filename) {
                suggestions.push(filename);
            }
        }
        if hits.is_empty() {
            hits = corrected;
        }
    }

    Ok(OperationResponse::ok(json!({
        "query": request.query,
        "hits": hits.iter().map(|h| json!({
            "path": h.path,
            "score": h.score,
            "language": h.language,
            "size": h.size,
        })).collect::<Vec<_>>(),
        "suggestions": suggestions,
    })))
}

pub async fn recent_files(
    engine: Arc<QuarryWorkspace>,
    request: RecentFilesRequest,
) -> EngineResult<OperationResponse> {
    let since_ms = chrono::Utc::now().timestamp_millis() - request.time_frame.as_millis();
    let filters = SearchFilters {
        extensions: request.extensions.clone(),
        language: request.language.clone(),
        ..Default::default()
    };

    let snapshot = engine.index.snapshot();
    let hits = engine
        .index
        .recent_files_search(&snapshot, since_ms, &filters, request.max_results)?;

    Ok(OperationResponse::ok(json!({
        "since_ms": since_ms,
        "files": hits.iter().map(|h| json!({
            "path": h.path,
            "last_modified": h.last_modified,
            "language": h.language,
            "size": h.size,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn similar_files(
    engine: Arc<QuarryWorkspace>,
    request: SimilarFilesRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let snapshot = engine.index.snapshot();
    if engine.index.hit_by_path(&snapshot, &request.seed_path)?.is_none() {
        return Err(EngineError::NotFound {
            what: format!("indexed file '{}'", request.seed_path),
        });
    }

    let hits = engine.index.more_like_this(
        &snapshot,
        &request.seed_path,
        request.min_term_frequency,
        request.max_query_terms,
        request.max_results,
    )?;

    Ok(OperationResponse::ok(json!({
        "seed_path": request.seed_path,
        "similar": hits.iter().map(|h| json!({
            "path": h.path,
            "score": h.score,
            "language": h.language,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn directory_search(
    engine: Arc<QuarryWorkspace>,
    request: DirectorySearchRequest,
) -> EngineResult<OperationResponse> {
    let snapshot = engine.index.snapshot();
    let hits = engine
        .index
        .directory_search(&snapshot, &request.directory, request.max_results)?;

    Ok(OperationResponse::ok(json!({
        "directory": request.directory,
        "files": hits.iter().map(|h| json!({
            "path": h.path,
            "size": h.size,
            "language": h.language,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn file_size_analysis(
    engine: Arc<QuarryWorkspace>,
    request: FileSizeAnalysisRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let snapshot = engine.index.snapshot();
    let hits = engine.index.size_range_search(
        &snapshot,
        request.min_size,
        request.max_size,
        request.max_results,
    )?;

    let total_bytes: i64 = hits.iter().map(|h| h.size).sum();
    Ok(OperationResponse::ok(json!({
        "total_bytes": total_bytes,
        "files": hits.iter().map(|h| json!({
            "path": h.path,
            "size": h.size,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn goto_definition(
    engine: Arc<QuarryWorkspace>,
    request: GotoDefinitionRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    let store = Arc::clone(&engine.store);
    let symbol_query = request.symbol.clone();
    let symbols = tokio::task::spawn_blocking(move || -> EngineResult<Vec<crate::extractors::Symbol>> {
        let store = store.lock().map_err(|_| EngineError::Cancelled)?;
        for candidate in crate::search::query::exact_lookup_candidates(&symbol_query) {
            let found = store.get_symbols_by_name(&candidate)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    })
    .await
    .map_err(|e| EngineError::Validation {
        reason: format!("lookup task failed: {e}"),
    })??;

    if symbols.is_empty() {
        return Err(EngineError::NotFound {
            what: format!("symbol '{}'", request.symbol),
        });
    }

    // Definitions first, members after
    let mut symbols = symbols;
    symbols.sort_by_key(|s| (!s.is_type_definition(), s.file_path.clone(), s.start_line));

    Ok(OperationResponse::ok(json!({
        "symbol": request.symbol,
        "definitions": symbols.iter().map(|s| json!({
            "id": s.id,
            "name": s.name,
            "kind": s.kind,
            "path": s.file_path,
            "start_line": s.start_line,
            "end_line": s.end_line,
            "signature": s.signature,
            "doc_comment": s.doc_comment,
        })).collect::<Vec<_>>(),
    })))
}

pub async fn find_references(
    engine: Arc<QuarryWorkspace>,
    request: FindReferencesRequest,
) -> EngineResult<OperationResponse> {
    request.validate()?;

    // Resolve the anchor symbol
    let store = Arc::clone(&engine.store);
    let symbol_id = request.symbol_id.clone();
    let name = request.name.clone();
    let anchor = tokio::task::spawn_blocking(move || -> EngineResult<Option<crate::extractors::Symbol>> {
        let store = store.lock().map_err(|_| EngineError::Cancelled)?;
        if let Some(id) = symbol_id {
            return store.get_symbol_by_id(&id);
        }
        if let Some(name) = name {
            let mut found = store.get_symbols_by_name(&name)?;
            found.sort_by_key(|s| !s.is_type_definition());
            return Ok(found.into_iter().next());
        }
        Ok(None)
    })
    .await
    .map_err(|e| EngineError::Validation {
        reason: format!("lookup task failed: {e}"),
    })??;

    let Some(anchor) = anchor else {
        return Err(EngineError::NotFound {
            what: "referenced symbol".to_string(),
        });
    };

    // Relationship fan-out from the store
    let store = Arc::clone(&engine.store);
    let anchor_id = anchor.id.clone();
    let max_depth = request.max_depth;
    let edges = tokio::task::spawn_blocking(
        move || -> EngineResult<Vec<(crate::database::RelationshipEdge, Option<crate::extractors::Symbol>)>> {
        let store = store.lock().map_err(|_| EngineError::Cancelled)?;
        let edges = store.get_relationships(&anchor_id, TraversalDirection::Both, max_depth)?;
        let mut out = Vec::new();
        for edge in edges {
            let other_id = if edge.relationship.source_symbol_id == anchor_id {
                &edge.relationship.target_symbol_id
            } else {
                &edge.relationship.source_symbol_id
            };
            let other = store.get_symbol_by_id(other_id)?;
            out.push((edge, other));
        }
        Ok(out)
    })
    .await
    .map_err(|e| EngineError::Validation {
        reason: format!("traversal task failed: {e}"),
    })??;

    // Merge with text-search mentions of the name
    let mut options = engine.plan_options();
    options.limit = 25;
    let mentions = match engine.search_composite(&anchor.name, options).await {
        Ok(composite) => composite
            .hits
            .into_iter()
            .filter(|h| h.path != anchor.file_path)
            .map(|h| json!({ "path": h.path, "tier": h.tier, "score": h.score }))
            .collect::<Vec<_>>(),
        Err(e) => {
            debug!("Mention search failed for '{}': {}", anchor.name, e);
            Vec::new()
        }
    };

    Ok(OperationResponse::ok(json!({
        "symbol": { "id": anchor.id, "name": anchor.name, "path": anchor.file_path },
        "relationships": edges.iter().map(|(edge, other)| json!({
            "kind": edge.relationship.kind,
            "depth": edge.depth,
            "line": edge.relationship.line,
            "other": other.as_ref().map(|s| json!({
                "id": s.id,
                "name": s.name,
                "path": s.file_path,
                "start_line": s.start_line,
            })),
        })).collect::<Vec<_>>(),
        "mentions": mentions,
    })))
}

pub async fn resolve_detail(
    engine: Arc<QuarryWorkspace>,
    request: ResolveDetailRequest,
) -> EngineResult<OperationResponse> {
    let hits = engine
        .shaper
        .resolve_detail(request.handle, &request.selector())?;

    Ok(OperationResponse::ok(json!({
        "handle": request.handle,
        "hits": hits,
    })))
}

pub async fn index_health(engine: Arc<QuarryWorkspace>) -> EngineResult<OperationResponse> {
    let health = engine.health_snapshot()?;
    Ok(OperationResponse::ok(json!({
        "healthy": health.healthy,
        "snapshot_generation": health.snapshot_generation,
        "snapshot_age_ms": health.snapshot_age_ms,
        "store_files": health.store_files,
        "store_symbols": health.store_symbols,
        "store_relationships": health.store_relationships,
        "index_docs": health.index_docs,
        "files_by_language": health.files_by_language,
        "quarantined_files": health.quarantined_files,
    })))
}

pub async fn system_health(engine: Arc<QuarryWorkspace>) -> EngineResult<OperationResponse> {
    let health = engine.health_snapshot()?;
    Ok(OperationResponse::ok(json!({
        "healthy": health.healthy,
        "pressure": health.pressure,
        "rss_bytes": health.rss_bytes,
        "pending_ingest_ops": health.pending_ingest_ops,
        "watcher_queue_depth": health.watcher_queue_depth,
        "extractor_workers": health.extractor_workers,
    })))
}

// End-to-end scenarios: real files on disk, the full engine in between,
// observable results out.

use crate::search::Tier;
use crate::shaper::{DetailSelector, ResponseMode};
use crate::workspace::QuarryWorkspace;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn open_and_index(dir: &TempDir) -> Arc<QuarryWorkspace> {
    let engine = Arc::new(QuarryWorkspace::open(dir.path()).unwrap());
    engine.index_workspace(false).await.unwrap();
    engine
}

fn long_plan(engine: &QuarryWorkspace) -> crate::search::PlanOptions {
    let mut options = engine.plan_options();
    options.deadline = Duration::from_millis(10_000);
    options
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_type_definition_outranks_mentions() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    // One definition site...
    fs::write(
        dir.path().join("src/user_service.ts"),
        "export class UserService {\n  findById(id: string) {}\n}\n",
    )
    .unwrap();
    // ...and thirty files that only mention the name in comments
    for i in 0..30 {
        fs::write(
            dir.path().join(format!("src/consumer_{i}.ts")),
            format!("// consumer {i} talks to UserService\nexport const n{i} = {i};\n"),
        )
        .unwrap();
    }

    let engine = open_and_index(&dir).await;
    let composite = engine
        .search_composite("UserService", long_plan(&engine))
        .await
        .unwrap();

    let first = &composite.hits[0];
    assert!(
        first.path.ends_with("user_service.ts"),
        "definition file must rank first, got {}",
        first.path
    );

    // The definition's margin over the best mention is at least 5x among
    // scored-tier hits
    let scored: Vec<_> = composite
        .hits
        .iter()
        .filter(|h| h.tier == Tier::Scored)
        .collect();
    if scored.len() >= 2 {
        let definition = scored
            .iter()
            .find(|h| h.path.ends_with("user_service.ts"))
            .expect("definition present in scored tier");
        let best_mention = scored
            .iter()
            .find(|h| !h.path.ends_with("user_service.ts"))
            .expect("mention present");
        assert!(
            definition.score >= best_mention.score * 5.0,
            "definition score {} vs mention {}",
            definition.score,
            best_mention.score
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_test_files_deboost_flips_with_query() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("tests")).unwrap();

    fs::write(
        dir.path().join("src/auth_service.rs"),
        "pub struct AuthService;\nimpl AuthService { pub fn login(&self) {} }\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("tests/auth_service.rs"),
        "// AuthService test coverage\n// exercises AuthService login paths\n#[test]\nfn auth_service_logs_in() {}\n",
    )
    .unwrap();

    let engine = open_and_index(&dir).await;

    let plain = engine
        .search_composite("AuthService", long_plan(&engine))
        .await
        .unwrap();
    let scored: Vec<&str> = plain
        .hits
        .iter()
        .filter(|h| h.tier == Tier::Scored)
        .map(|h| h.path.as_str())
        .collect();
    let src_rank = scored.iter().position(|p| p.contains("src/")).unwrap();
    let test_rank = scored.iter().position(|p| p.contains("tests/")).unwrap();
    assert!(src_rank < test_rank, "production file must rank above test");

    // Asking for tests flips the ordering
    let test_query = engine
        .search_composite("test AuthService", long_plan(&engine))
        .await
        .unwrap();
    let scored: Vec<&str> = test_query
        .hits
        .iter()
        .filter(|h| h.tier == Tier::Scored)
        .map(|h| h.path.as_str())
        .collect();
    if let (Some(src_rank), Some(test_rank)) = (
        scored.iter().position(|p| p.contains("src/")),
        scored.iter().position(|p| p.contains("tests/")),
    ) {
        assert!(
            test_rank < src_rank,
            "test file must rank above production when the query says test"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_incremental_update_single_file() {
    let dir = TempDir::new().unwrap();
    for i in 0..25 {
        fs::write(
            dir.path().join(format!("mod_{i}.rs")),
            format!("pub fn existing_{i}() {{}}\n"),
        )
        .unwrap();
    }

    let engine = open_and_index(&dir).await;
    assert_eq!(engine.index.num_docs(), 25);

    // Modify exactly one file
    let target = dir.path().join("mod_7.rs");
    fs::write(&target, "pub fn existing_7() {}\npub fn freshly_added_xyz() {}\n").unwrap();

    let report = engine.index_workspace(false).await.unwrap();
    assert_eq!(report.files_indexed, 1, "exactly one file re-ingested");
    assert_eq!(report.files_failed, 0);

    let composite = engine
        .search_composite("freshly_added_xyz", long_plan(&engine))
        .await
        .unwrap();
    assert!(composite.hits.iter().any(|h| h.path.ends_with("mod_7.rs")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_detail_handle_progressive_disclosure() {
    let dir = TempDir::new().unwrap();
    for i in 0..40 {
        fs::write(
            dir.path().join(format!("doc_{i}.rs")),
            format!(
                "pub fn shared_needle_{i}() {{}}\n// shared_needle everywhere\n{}",
                "// padding line with shared_needle text\n".repeat(60)
            ),
        )
        .unwrap();
    }

    let engine = open_and_index(&dir).await;

    let mut options = long_plan(&engine);
    options.limit = 40;
    let shaped = engine
        .search("shared_needle", options, Some(1_000), ResponseMode::Auto)
        .await
        .unwrap();

    assert_eq!(shaped.mode, ResponseMode::Summary);
    assert!(shaped.auto_switched);
    let handle = shaped.detail_handle.expect("summary must carry a handle");

    // Slice resolution returns parked hits without re-running the search
    let slice = engine
        .shaper
        .resolve_detail(handle, &DetailSelector::Range { start: 1, end: 10 })
        .unwrap();
    assert_eq!(slice.len(), 10);

    // The same handle keeps answering identically
    let again = engine
        .shaper
        .resolve_detail(handle, &DetailSelector::Range { start: 1, end: 10 })
        .unwrap();
    let a: Vec<&String> = slice.iter().map(|h| &h.path).collect();
    let b: Vec<&String> = again.iter().map(|h| &h.path).collect();
    assert_eq!(a, b);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fuzzy_file_search_with_suggestions() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("UserService.ts"),
        "export class UserService {}\n",
    )
    .unwrap();

    let engine = open_and_index(&dir).await;
    let registry = crate::ops::OperationRegistry::new();

    let response = registry
        .dispatch(
            Arc::clone(&engine),
            "file_search",
            serde_json::json!({ "query": "UserServce~" }),
        )
        .await;

    assert!(response.success);
    let hits = response.data["hits"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0]["path"]
        .as_str()
        .unwrap()
        .ends_with("UserService.ts"));
    let suggestions = response.data["suggestions"].as_array().unwrap();
    assert!(!suggestions.is_empty(), "suggestions must be present");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_workspace() {
    let dir = TempDir::new().unwrap();
    let engine = open_and_index(&dir).await;

    assert_eq!(engine.index.num_docs(), 0);
    let composite = engine
        .search_composite("anything", long_plan(&engine))
        .await
        .unwrap();
    assert!(composite.hits.is_empty());

    let health = engine.health_snapshot().unwrap();
    assert!(health.healthy);
    assert_eq!(health.store_files, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_only_workspace() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
    fs::write(dir.path().join("image.rs"), b"\x00\xFF\x00\xFF").unwrap();

    let engine = open_and_index(&dir).await;

    // Both listed in the file table, neither contributed symbols
    let health = engine.health_snapshot().unwrap();
    assert_eq!(health.store_files, 2);
    assert_eq!(health.store_symbols, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_ascii_paths() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("größenwahn.rs"),
        "pub fn übermäßig_groß() {}\n",
    )
    .unwrap();

    let engine = open_and_index(&dir).await;
    assert_eq!(engine.index.num_docs(), 1);

    let composite = engine
        .search_composite("übermäßig_groß", long_plan(&engine))
        .await
        .unwrap();
    assert!(!composite.hits.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_syntactic_queries_never_crash() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("generics.rs"),
        "pub fn collect_all() -> Vec<String> { Vec::new() }\n",
    )
    .unwrap();

    let engine = open_and_index(&dir).await;

    for query in ["Vec<String>", "Vec::new", "a[0]", "x: &mut T", "(((", "]]]"] {
        let result = engine.search_composite(query, long_plan(&engine)).await;
        assert!(result.is_ok(), "query '{query}' crashed a tier");
    }

    // The literal tier gives a meaningful result for the generic type
    let composite = engine
        .search_composite("Vec<String>", long_plan(&engine))
        .await
        .unwrap();
    assert!(composite
        .hits
        .iter()
        .any(|h| h.path.ends_with("generics.rs")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_goto_definition_and_find_references() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("service.rs"),
        "pub trait Greeter { fn greet(&self); }\n\npub struct HelloService;\n\nimpl Greeter for HelloService {\n    fn greet(&self) {}\n}\n",
    )
    .unwrap();

    let engine = open_and_index(&dir).await;
    let registry = crate::ops::OperationRegistry::new();

    let response = registry
        .dispatch(
            Arc::clone(&engine),
            "goto_definition",
            serde_json::json!({ "symbol": "HelloService" }),
        )
        .await;
    assert!(response.success);
    let defs = response.data["definitions"].as_array().unwrap();
    assert_eq!(defs[0]["kind"], "struct");
    assert_eq!(defs[0]["name"], "HelloService");

    let response = registry
        .dispatch(
            Arc::clone(&engine),
            "find_references",
            serde_json::json!({ "name": "HelloService", "max_depth": 2 }),
        )
        .await;
    assert!(response.success);
    let relationships = response.data["relationships"].as_array().unwrap();
    assert!(
        relationships
            .iter()
            .any(|r| r["kind"] == "implements" || r["kind"] == "contains"),
        "expected implements/contains edges, got {relationships:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_rapid_create_modify_delete() {
    let dir = TempDir::new().unwrap();
    let engine = open_and_index(&dir).await;
    engine.start_watching().unwrap();

    let path = dir.path().join("flicker.rs");

    // Rapid triplet inside one debounce window
    fs::write(&path, "pub fn v1() {}").unwrap();
    fs::write(&path, "pub fn v2() {}").unwrap();
    fs::remove_file(&path).unwrap();

    // Give the watcher time to settle, then verify the file is absent
    tokio::time::sleep(Duration::from_millis(800)).await;
    engine.pipeline.flush().await.unwrap();

    let snapshot = engine.index.snapshot();
    let hit = engine
        .index
        .hit_by_path(&snapshot, &path.to_string_lossy())
        .unwrap();
    assert!(hit.is_none(), "deleted file must not remain indexed");

    engine.shutdown().await.unwrap();
}

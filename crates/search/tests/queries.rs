//! Query-surface tests against a scripted fake engine.

#![cfg(unix)]

use scour_indexer::{IndexService, ServiceConfig};
use scour_protocol::{CaseMode, FileSearchMode, FileSearchRequest, TextSearchRequest};
use scour_search::{QueryEngine, SearchError};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FAKE_ENGINE: &str = r#"cmd="$1"; cfg="$2"; shift 2
mkdir -p "$(dirname "$cfg")" 2>/dev/null
echo "$cmd $*" >> "${cfg}.invocations"
case "$cmd" in
  init) : > "$cfg" ;;
  update) echo '[100%] 3 files' ;;
  search)
    echo 'src/main.rs:1:needle one'
    echo 'src/lib.rs:2:needle two'
    echo 'Search complete, found 2 matches in 0.01 sec'
    ;;
  files)
    printf '90\tsrc/main.rs\n'
    echo 'src/main.rs'
    echo 'src/lib.rs'
    ;;
  watch) sleep 30 ;;
esac
exit 0
"#;

const BROKEN_ENGINE: &str = r#"echo 'Error: no index storage' >&2
exit 2
"#;

fn write_engine(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-engine");
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn service_with(engine: PathBuf) -> IndexService {
    IndexService::start(ServiceConfig {
        engine_path: Some(engine),
        watch_restart_delay: Duration::from_secs(30),
        ..ServiceConfig::default()
    })
    .unwrap()
}

fn engine_for(service: &IndexService) -> QueryEngine {
    QueryEngine::with_init_wait(
        service.clone(),
        Duration::from_millis(50),
        Duration::from_secs(10),
    )
}

fn make_root(dir: &Path, name: &str) -> PathBuf {
    let root = dir.join(name);
    std::fs::create_dir_all(root.join("src")).unwrap();
    root
}

fn invocations(root: &Path) -> Vec<String> {
    std::fs::read_to_string(root.join(".scour/scour.cfg.invocations"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn caller_ceiling_caps_across_roots() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    for name in ["alpha", "beta", "gamma"] {
        let root = make_root(dir.path(), name);
        service.add_root(&root).unwrap();
        service.init_root(&root).await.unwrap();
    }

    let query = engine_for(&service);
    let response = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: None,
            max_results: Some(3),
            case: None,
        })
        .await
        .unwrap();

    // Three roots with two matches each, sliced to the caller's three.
    assert_eq!(response.count, 3);
    assert_eq!(response.total_available, 6);
    assert!(response.capped);
    assert_eq!(response.case_mode_applied, CaseMode::Insensitive);
    assert_eq!(response.max_results_applied, 3);
    assert_eq!(response.max_results_requested, None);
    service.shutdown();
}

#[tokio::test]
async fn query_over_uninitialized_root_triggers_init() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();
    assert!(!service.is_initialized(&root));

    let query = engine_for(&service);
    let response = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: None,
            max_results: Some(5),
            case: None,
        })
        .await
        .unwrap();

    assert!(service.is_initialized(&root));
    assert_eq!(response.count, 2);
    assert!(!response.capped);
    assert_eq!(response.total_available, 2);
    service.shutdown();
}

#[tokio::test]
async fn named_scope_targets_only_that_root() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let alpha = make_root(dir.path(), "Alpha");
    let beta = make_root(dir.path(), "Beta");
    service.add_root(&alpha).unwrap();
    service.add_root(&beta).unwrap();

    let query = engine_for(&service);
    let response = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: Some("Alpha/src".to_string()),
            max_results: None,
            case: None,
        })
        .await
        .unwrap();
    assert_eq!(response.count, 2);

    let alpha_calls = invocations(&alpha);
    assert!(alpha_calls
        .iter()
        .any(|call| call.starts_with("search") && call.contains("fi^src/")));
    // Beta was neither initialized nor searched.
    assert!(invocations(&beta).is_empty());
    assert!(!service.is_initialized(&beta));
    service.shutdown();
}

#[tokio::test]
async fn bare_relative_scope_in_both_roots_is_ambiguous() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    for name in ["Alpha", "Beta"] {
        let root = make_root(dir.path(), name);
        service.add_root(&root).unwrap();
    }

    let query = engine_for(&service);
    let err = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: Some("src".to_string()),
            max_results: None,
            case: None,
        })
        .await
        .unwrap_err();

    match err {
        SearchError::AmbiguousPath { candidates, .. } => {
            assert_eq!(candidates, "Alpha, Beta");
        }
        other => panic!("expected ambiguity error, got {other}"),
    }
    service.shutdown();
}

#[tokio::test]
async fn file_search_dedupes_by_normalized_path() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();
    service.init_root(&root).await.unwrap();

    let query = engine_for(&service);
    let response = query
        .file_search(&FileSearchRequest {
            query: "main".to_string(),
            mode: FileSearchMode::Fuzzy,
            search_path: None,
            max_results: None,
        })
        .await
        .unwrap();

    // The scored and plain lines for src/main.rs collapse into one.
    assert_eq!(response.count, 2);
    assert_eq!(response.total_available, 2);
    let main = root.join("src/main.rs").display().to_string();
    assert_eq!(
        response.files.iter().filter(|f| f.path == main).count(),
        1
    );
    service.shutdown();
}

#[tokio::test]
async fn forced_and_smart_case_flags_reach_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();
    service.init_root(&root).await.unwrap();

    let query = engine_for(&service);

    let smart = query
        .text_search(&TextSearchRequest {
            query: "NeedLe".to_string(),
            search_path: None,
            max_results: None,
            case: None,
        })
        .await
        .unwrap();
    assert_eq!(smart.case_mode_applied, CaseMode::Sensitive);

    let forced = query
        .text_search(&TextSearchRequest {
            query: "NeedLe".to_string(),
            search_path: None,
            max_results: None,
            case: Some(CaseMode::Insensitive),
        })
        .await
        .unwrap();
    assert_eq!(forced.case_mode_applied, CaseMode::Insensitive);

    let calls = invocations(&root);
    assert!(calls.iter().any(|c| c.starts_with("search") && c.contains(" S ")));
    assert!(calls.iter().any(|c| c.starts_with("search") && c.contains(" i ")));
    service.shutdown();
}

#[tokio::test]
async fn clamped_ceiling_is_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();
    service.init_root(&root).await.unwrap();

    let query = engine_for(&service);
    let response = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: None,
            max_results: Some(5000),
            case: None,
        })
        .await
        .unwrap();
    assert_eq!(response.max_results_applied, 1000);
    assert_eq!(response.max_results_requested, Some(5000));
    service.shutdown();
}

#[tokio::test]
async fn init_timeout_names_the_unready_roots() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), BROKEN_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();

    let query = QueryEngine::with_init_wait(
        service.clone(),
        Duration::from_millis(50),
        Duration::from_millis(300),
    );
    let err = query
        .text_search(&TextSearchRequest {
            query: "needle".to_string(),
            search_path: None,
            max_results: None,
            case: None,
        })
        .await
        .unwrap_err();

    match err {
        SearchError::InitTimeout(names) => assert_eq!(names, "alpha"),
        other => panic!("expected init timeout, got {other}"),
    }
    service.shutdown();
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_subprocess() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_engine(dir.path(), FAKE_ENGINE);
    let service = service_with(engine);
    let root = make_root(dir.path(), "alpha");
    service.add_root(&root).unwrap();

    let query = engine_for(&service);
    let err = query
        .text_search(&TextSearchRequest {
            query: "   ".to_string(),
            search_path: None,
            max_results: None,
            case: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::EmptyQuery));
    assert!(invocations(&root).is_empty());
    service.shutdown();
}

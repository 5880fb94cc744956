//! End-to-end library tests: filesystem source tree, SQLite stores, and the
//! hash embedder wired together the way `cidx reindex` wires them.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use code_index::config::{Config, SourceConfig};
use code_index::connector_fs::FsSourceTree;
use code_index::embedding::{EmbeddingClient, HashEmbedder};
use code_index::indexer::Indexer;
use code_index::search::SearchService;
use code_index::sqlite_store::{open_stores, SqliteFingerprintStore, SqliteIndexStore};
use code_index_core::chunk::ChunkConfig;
use code_index_core::store::IndexStore;
use code_index_core::IndexError;

struct Env {
    _tmp: TempDir,
    files: std::path::PathBuf,
    index: Arc<SqliteIndexStore>,
    fingerprints: Arc<SqliteFingerprintStore>,
}

async fn setup(files: &[(&str, &str)]) -> Env {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("tree");
    fs::create_dir_all(&root).unwrap();
    for (path, content) in files {
        write(&root, path, content);
    }
    let config = Config::minimal(tmp.path().join("index.sqlite"));
    let (index, fingerprints) = open_stores(&config).await.unwrap();
    Env {
        _tmp: tmp,
        files: root,
        index: Arc::new(index),
        fingerprints: Arc::new(fingerprints),
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn indexer(env: &Env, dims: usize) -> Indexer {
    let source = FsSourceTree::new(&SourceConfig {
        root: env.files.clone(),
        include_globs: vec!["*.txt".to_string(), "*.rs".to_string()],
        ..SourceConfig::default()
    })
    .unwrap();
    Indexer::new(
        Arc::new(source),
        ChunkConfig::new(64, 16).unwrap(),
        EmbeddingClient::new(Arc::new(HashEmbedder::new(dims)), 4, 0, Duration::ZERO),
        env.index.clone(),
        env.fingerprints.clone(),
    )
    .with_concurrency(4)
}

async fn indexed_files(env: &Env) -> BTreeSet<String> {
    env.index
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.filename)
        .collect()
}

#[tokio::test]
async fn reindex_twice_is_a_no_op() {
    let long = "fn step() { let total = total + 1; }\n".repeat(12);
    let env = setup(&[("a.rs", long.as_str()), ("b.txt", "plain notes")]).await;
    let indexer = indexer(&env, 64);

    let first = indexer.reindex().await.unwrap();
    assert_eq!(first.added, 2);
    let before = env.index.snapshot().await.unwrap();
    assert!(before.len() > 2);

    let second = indexer.reindex().await.unwrap();
    assert_eq!((second.added, second.modified, second.removed), (0, 0, 0));
    assert_eq!(second.unchanged, 2);
    assert_eq!(env.index.snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn incremental_add_modify_remove() {
    let env = setup(&[("a.txt", "hello"), ("b.txt", "world")]).await;
    let indexer = indexer(&env, 64);
    indexer.reindex().await.unwrap();

    write(&env.files, "a.txt", "hello!");
    write(&env.files, "c.txt", "brand new");
    fs::remove_file(env.files.join("b.txt")).unwrap();

    let report = indexer.reindex().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.modified, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.unchanged, 0);

    let files: Vec<String> = indexed_files(&env).await.into_iter().collect();
    assert_eq!(files, vec!["a.txt".to_string(), "c.txt".to_string()]);
    let a = env.index.entries_for_file("a.txt").await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].text, "hello!");
}

#[tokio::test]
async fn chunks_cover_file_with_fixed_overlap() {
    let text: String = (0..300).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let env = setup(&[("long.txt", text.as_str())]).await;
    indexer(&env, 32).reindex().await.unwrap();

    let entries = env.index.entries_for_file("long.txt").await.unwrap();
    assert_eq!(entries.first().unwrap().location.start.byte_offset, 0);
    assert_eq!(entries.last().unwrap().location.end.byte_offset, text.len());
    for pair in entries.windows(2) {
        assert_eq!(
            pair[0].location.end.byte_offset - pair[1].location.start.byte_offset,
            16
        );
    }
}

#[tokio::test]
async fn search_ranks_matching_file_first() {
    let env = setup(&[
        ("db.rs", "fn open_pool() { database connection pool open }"),
        ("ui.rs", "fn render() { red login button render }"),
        ("notes.txt", "weekly planning meeting notes"),
    ])
    .await;
    indexer(&env, 128).reindex().await.unwrap();

    let search = SearchService::new(
        EmbeddingClient::new(Arc::new(HashEmbedder::new(128)), 4, 0, Duration::ZERO),
        env.index.clone(),
        5,
    );
    let hits = search.search("database connection pool", Some(1)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "db.rs");

    let all = search.search("database connection pool", None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

    assert!(matches!(
        search.search("", Some(3)).await,
        Err(IndexError::InvalidQuery(_))
    ));
}

#[tokio::test]
async fn dimension_drift_is_rejected() {
    let env = setup(&[("a.txt", "hello world")]).await;
    indexer(&env, 64).reindex().await.unwrap();

    write(&env.files, "a.txt", "hello again");
    let err = indexer(&env, 96).reindex().await.unwrap_err();
    assert!(matches!(err, IndexError::DimensionMismatch { expected: 64, actual: 96 }));

    let search = SearchService::new(
        EmbeddingClient::new(Arc::new(HashEmbedder::new(96)), 4, 0, Duration::ZERO),
        env.index.clone(),
        5,
    );
    assert!(matches!(
        search.search("hello", None).await,
        Err(IndexError::DimensionMismatch { .. })
    ));
    assert_eq!(env.index.entries_for_file("a.txt").await.unwrap()[0].text, "hello world");
}

#[tokio::test]
async fn non_utf8_file_is_a_per_file_failure() {
    let env = setup(&[("good.txt", "fine")]).await;
    fs::write(env.files.join("bad.txt"), [0xffu8, 0xfe, 0x00]).unwrap();

    let report = indexer(&env, 32).reindex().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "bad.txt");
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_directory_does_not_drop_entries() {
    use std::os::unix::fs::PermissionsExt;

    let env = setup(&[("locked/a.rs", "fn a() {}"), ("b.rs", "fn b() {}")]).await;
    let indexer = indexer(&env, 32);
    assert_eq!(indexer.reindex().await.unwrap().added, 2);

    let locked = env.files.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permission bits are not enforced (running as root).
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let report = indexer.reindex().await;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let report = report.unwrap();

    assert_eq!(report.removed, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "locked");
    assert_eq!(env.index.entries_for_file("locked/a.rs").await.unwrap().len(), 1);
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cidx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_cidx"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("src")).unwrap();
    fs::create_dir_all(files_dir.join("target")).unwrap();
    fs::write(
        files_dir.join("src/db.rs"),
        "/// Open a database connection pool.\npub fn open_pool(path: &str) -> Pool {\n    Pool::connect(path)\n}\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("src/render.py"),
        "def render_button(color):\n    return f\"<button class='{color}'>login</button>\"\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("README.md"),
        "# Demo\n\nA tiny project used to exercise the indexer.\n",
    )
    .unwrap();
    fs::write(files_dir.join("target/generated.rs"), "fn ignored() {}\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/cidx.sqlite"

[chunking]
chunk_size = 200
chunk_overlap = 40

[source]
root = "{root}/files"

[embedding]
provider = "hash"
dims = 128

[indexing]
concurrency = 2

[retrieval]
default_top_k = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("cidx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cidx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cidx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn reindex_json(config_path: &Path) -> serde_json::Value {
    let (stdout, stderr, success) =
        run_cidx(config_path, &["reindex", "--json", "--progress", "off"]);
    assert!(success, "reindex failed: {}", stderr);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_cidx(&config_path, &["init"]);
    assert!(success);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/cidx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    assert!(run_cidx(&config_path, &["init"]).2);
    assert!(run_cidx(&config_path, &["init"]).2);
}

#[test]
fn test_sources_respects_excludes() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_cidx(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("src/db.rs"));
    assert!(stdout.contains("README.md"));
    assert!(!stdout.contains("generated.rs"));
    assert!(stdout.contains("3 files"));
}

#[test]
fn test_reindex_then_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let first = reindex_json(&config_path);
    assert_eq!(first["added"], 3);
    assert_eq!(first["failures"].as_array().unwrap().len(), 0);

    let second = reindex_json(&config_path);
    assert_eq!(second["added"], 0);
    assert_eq!(second["modified"], 0);
    assert_eq!(second["removed"], 0);
    assert_eq!(second["unchanged"], 3);
    assert_eq!(second["chunks_embedded"], 0);
}

#[test]
fn test_reindex_incremental() {
    let (tmp, config_path) = setup_test_env();
    reindex_json(&config_path);

    let files = tmp.path().join("files");
    fs::write(files.join("README.md"), "# Demo\n\nNow with more words.\n").unwrap();
    fs::remove_file(files.join("src/render.py")).unwrap();
    fs::write(files.join("src/new.rs"), "pub fn fresh() {}\n").unwrap();

    let report = reindex_json(&config_path);
    assert_eq!(report["added"], 1);
    assert_eq!(report["modified"], 1);
    assert_eq!(report["removed"], 1);
    assert_eq!(report["unchanged"], 1);

    let (stdout, _, success) = run_cidx(
        &config_path,
        &["search", "render button", "--json", "--top-k", "10"],
    );
    assert!(success);
    let hits: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(hits.iter().all(|h| h["filename"] != "src/render.py"));
}

#[test]
fn test_reindex_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_cidx(&config_path, &["reindex", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("added: 3"));

    let report = reindex_json(&config_path);
    assert_eq!(report["added"], 3);
}

#[test]
fn test_search_finds_relevant_file() {
    let (_tmp, config_path) = setup_test_env();
    reindex_json(&config_path);

    let (stdout, stderr, success) = run_cidx(
        &config_path,
        &["search", "open database connection pool", "--json", "--top-k", "1"],
    );
    assert!(success, "search failed: {}", stderr);
    let hits: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["filename"], "src/db.rs");
    assert!(hits[0]["score"].as_f64().unwrap() <= 1.0);
    assert_eq!(hits[0]["start"]["line"], 1);
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    reindex_json(&config_path);
    let (a, _, _) = run_cidx(&config_path, &["search", "login button", "--json"]);
    let (b, _, _) = run_cidx(&config_path, &["search", "login button", "--json"]);
    assert_eq!(a, b);
}

#[test]
fn test_search_empty_query_fails() {
    let (_tmp, config_path) = setup_test_env();
    reindex_json(&config_path);
    let (_, stderr, success) = run_cidx(&config_path, &["search", "   "]);
    assert!(!success);
    assert!(stderr.contains("invalid query"));
}

#[test]
fn test_stats_after_reindex() {
    let (_tmp, config_path) = setup_test_env();
    reindex_json(&config_path);
    let (stdout, _, success) = run_cidx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("3 tracked"));
    assert!(stdout.contains("Dimension:   128"));
}

#[test]
fn test_invalid_chunk_config_rejected() {
    let (tmp, config_path) = setup_test_env();
    let broken = fs::read_to_string(&config_path)
        .unwrap()
        .replace("chunk_overlap = 40", "chunk_overlap = 200");
    let broken_path = tmp.path().join("config/broken.toml");
    fs::write(&broken_path, broken).unwrap();

    let (_, stderr, success) = run_cidx(&broken_path, &["reindex"]);
    assert!(!success);
    assert!(stderr.contains("chunk"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_cidx(Path::new("/definitely/missing.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docent_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docent"))
}

/// Temp root with `config/docent.toml` and an empty `documents/` directory.
/// Models are disabled and the search index is in memory.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("documents")).unwrap();

    let config_content = format!(
        r#"[logging]
level = "warn"

[retrieval]
top_k = 7

[embedding]
provider = "disabled"
max_attempts = 1
base_delay_ms = 1
max_delay_ms = 1

[search]
backend = "memory"
index_name = "handbooks"

[storage]
backend = "filesystem"

[storage.filesystem]
root = "{}/documents"
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("docent.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docent(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docent_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docent binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_config_prints_summary() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_docent(&config_path, &["config"]);
    assert!(success, "config failed: stdout={}, stderr={}", stdout, stderr);

    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["top_k"], 7);
    assert_eq!(summary["index_name"], "handbooks");
    assert_eq!(summary["search_backend"], "memory");
    assert_eq!(summary["storage"], "filesystem");
}

#[test]
fn test_invalid_config_aborts() {
    let (_tmp, config_path) = setup_test_env("");
    let text = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        format!("{}\n[chunking]\nchunk_size = 100\nchunk_overlap = 80\n", text),
    )
    .unwrap();

    let (_, stderr, success) = run_docent(&config_path, &["config"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docent(&tmp.path().join("nope.toml"), &["config"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ingest_empty_storage_succeeds() {
    let (tmp, config_path) = setup_test_env("");
    fs::write(tmp.path().join("documents/readme.txt"), "not a pdf").unwrap();

    let (stdout, stderr, success) = run_docent(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Found 0 documents in storage"));
    assert!(stdout.contains("No documents found in storage"));
}

#[test]
fn test_ingest_without_text_fails() {
    let (tmp, config_path) = setup_test_env("");
    fs::write(tmp.path().join("documents/broken.pdf"), b"not a valid pdf").unwrap();

    let (stdout, _, success) = run_docent(&config_path, &["ingest", "--force-reindex"]);
    assert!(!success);
    assert!(stdout.contains("Failed to process 'broken.pdf'"), "{}", stdout);
    assert!(stdout.contains("No text chunks extracted"));
    assert!(stdout.contains("failures: 1"));
}

#[test]
fn test_ask_with_disabled_embeddings_answers_with_search_error() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_docent(&config_path, &["ask", "What is the refund window?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("An error occurred while searching the documents"));
    assert!(!stdout.contains("disabled"), "upstream error leaked: {}", stdout);
}

#[test]
fn test_ask_rejects_invalid_top_k() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_docent(&config_path, &["ask", "refunds?", "--top-k", "25"]);
    assert!(!success);
    assert!(stderr.contains("top_k must be between 1 and 20"));
}

#[test]
fn test_index_commands() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, _, success) = run_docent(&config_path, &["index", "create"]);
    assert!(success);
    assert!(stdout.contains("Index 'handbooks' created or updated."));

    let (stdout, _, success) = run_docent(&config_path, &["index", "delete"]);
    assert!(success);
    assert!(stdout.contains("deleted"));
}

#[test]
fn test_missing_document_root_is_reported() {
    let (tmp, config_path) = setup_test_env("");
    fs::remove_dir_all(tmp.path().join("documents")).unwrap();

    let (_, stderr, success) = run_docent(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("Document root does not exist"));
}

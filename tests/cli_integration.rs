//! CLI Integration Tests
//!
//! These tests run the built `triedb` binary end-to-end against a store
//! file in a temporary directory.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::process::Command;
use tempfile::tempdir;

/// Run triedb and return (stdout, stderr, success)
fn run_triedb(args: &[&str], db_path: &str) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_triedb"))
        .args(["-d", db_path, "-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute triedb");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be a JSON document")
}

/// Insert values and return the committed root hash
fn insert(values: &[&str], db_path: &str) -> String {
    let mut args = vec!["insert"];
    args.extend_from_slice(values);
    let (stdout, stderr, success) = run_triedb(&args, db_path);
    assert!(success, "insert should succeed: {}", stderr);
    parse(&stdout)["root"]
        .as_str()
        .expect("insert should print the root")
        .to_string()
}

// ============================================================================
// Store Initialization Tests
// ============================================================================

#[test]
fn test_cli_init_creates_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    let (stdout, _stderr, success) = run_triedb(&["init"], db_str);

    assert!(success, "init should succeed");
    assert_eq!(parse(&stdout)["status"], "ok");
    assert!(db_path.exists(), "store file should be created");
    assert!(dir.path().join("nodes.triedb.config").exists());
}

#[test]
fn test_cli_default_path() {
    let output = Command::new(env!("CARGO_BIN_EXE_triedb"))
        .args(["--help"])
        .output()
        .expect("Failed to execute triedb");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("[default: nodes.triedb]"),
        "Default store path should be nodes.triedb, got: {}",
        stdout
    );
}

#[test]
fn test_cli_rejects_foreign_file() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("not-a-store");
    std::fs::write(&db_path, vec![0u8; 128]).unwrap();

    let (_stdout, _stderr, success) = run_triedb(&["stats"], db_path.to_str().unwrap());
    assert!(!success, "stats should refuse a file without the magic header");
}

// ============================================================================
// Node Tests
// ============================================================================

#[test]
fn test_cli_insert_and_get_root() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let root = insert(&["alpha", "beta", "gamma"], db_str);
    assert_eq!(root.len(), 64);

    let (stdout, _stderr, success) = run_triedb(&["get", &root], db_str);
    assert!(success, "get should succeed");
    let node = parse(&stdout);
    assert_eq!(node["hash"], root.as_str());
    assert!(node["node"]["Branch"]["children"].is_object());
}

#[test]
fn test_cli_insert_is_deterministic() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let first = insert(&["one", "two"], db_str);
    let second = insert(&["one", "two"], db_str);
    assert_eq!(first, second);

    // Content addressing stores the shared nodes once
    let (stdout, _, _) = run_triedb(&["stats"], db_str);
    assert_eq!(parse(&stdout)["objects"], 3);
}

#[test]
fn test_cli_get_missing_node() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let missing = "ab".repeat(32);

    let (stdout, _stderr, success) = run_triedb(&["get", &missing], db_str);
    assert!(!success, "get of a missing node should fail");
    assert_eq!(parse(&stdout)["status"], "error");
}

#[test]
fn test_cli_get_invalid_hash() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let (_stdout, stderr, success) = run_triedb(&["get", "not-hex"], db_str);
    assert!(!success);
    assert!(stderr.contains("Invalid hash"), "got: {}", stderr);
}

// ============================================================================
// Verification Tests
// ============================================================================

#[test]
fn test_cli_verify_committed_root() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let root = insert(&["a", "b", "c", "d"], db_str);

    let (stdout, _stderr, success) = run_triedb(&["verify", &root], db_str);
    assert!(success, "verify should succeed");
    let report = parse(&stdout);
    assert_eq!(report["status"], "ok");
    assert_eq!(report["nodes"], 5);
}

#[test]
fn test_cli_verify_unknown_root_fails() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let (stdout, _stderr, success) = run_triedb(&["verify", &"cd".repeat(32)], db_str);

    assert!(!success);
    let report = parse(&stdout);
    assert_eq!(report["missing"].as_array().map(Vec::len), Some(1));
}

// ============================================================================
// Output Format Tests
// ============================================================================

#[test]
fn test_cli_text_format_and_verbose_logging() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    let output = Command::new(env!("CARGO_BIN_EXE_triedb"))
        .args(["-d", db_str, "-f", "text", "-v", "insert", "x", "y"])
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute triedb");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("\n  \"root\""), "text output is pretty-printed");
    assert!(stderr.contains("database.commit"), "got: {}", stderr);
}

#[test]
fn test_cli_stats() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("nodes.triedb");
    let db_str = db_path.to_str().unwrap();

    run_triedb(&["init"], db_str);
    insert(&["v"], db_str);

    let (stdout, _stderr, success) = run_triedb(&["stats"], db_str);
    assert!(success);
    let stats = parse(&stdout);
    assert_eq!(stats["objects"], 2);
    assert!(stats["file_size"].as_u64().unwrap() > 64);
    assert_eq!(stats["config"]["clean_cache_shards"], 16);
}

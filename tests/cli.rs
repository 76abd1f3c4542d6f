use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn loominal_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("loominal");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/loominal.sqlite"

[retrieval]
default_top_k = 5

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("loominal.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_loominal(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = loominal_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run loominal binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_loominal(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/loominal.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_loominal(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_loominal(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_project_create_and_list() {
    let (_tmp, config_path) = setup_test_env();
    run_loominal(&config_path, &["init"]);

    let (stdout, stderr, success) = run_loominal(&config_path, &["project", "create", "payments"]);
    assert!(success, "create failed: {}", stderr);
    assert!(stdout.contains("Created project 1 (payments)"));

    run_loominal(&config_path, &["project", "create", "billing"]);

    let (stdout, _, success) = run_loominal(&config_path, &["project", "list"]);
    assert!(success);
    let payments = stdout.find("payments").unwrap();
    let billing = stdout.find("billing").unwrap();
    assert!(payments < billing, "projects should be listed by id");
}

#[test]
fn test_project_list_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_loominal(&config_path, &["init"]);

    let (stdout, _, success) = run_loominal(&config_path, &["project", "list"]);
    assert!(success);
    assert!(stdout.contains("No projects."));
}

#[test]
fn test_query_rejects_zero_top_k() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_loominal(&config_path, &["query", "1", "q", "--top-k", "0"]);
    assert!(!success);
    assert!(stderr.contains("top-k") || stderr.contains("top_k"));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[embedding]\nmodel = \"bge-base-en-v1.5\"\ndims = 384\n\n[server]\nbind = \"127.0.0.1:0\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_loominal(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("does not match"), "stderr: {}", stderr);
}

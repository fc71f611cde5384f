//! Runs the `quran` binary against a temporary database and a mock source.

mod common;

use httpmock::prelude::*;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn quran_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("quran");
    path
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/quran.sqlite"

[source]
base_url = "{}"
language = "{}"
timeout_secs = 5

[retrieval]
default_limit = 5
"#,
        root.display(),
        base_url,
        common::LANG
    );

    let config_path = config_dir.join("quran.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_quran(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = quran_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("QURAN_DB_PATH")
        .env_remove("QURAN_BIND")
        .env_remove("QURAN_RATE_PER_MIN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run quran binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn mock_corpus() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_err() {
        eprintln!("Skipping: cannot bind to localhost");
        return None;
    }
    let server = MockServer::start();
    for (path, doc) in common::corpus() {
        server.mock(|when, then| {
            when.method(GET).path(format!("/{}", path));
            then.status(200).json_body(doc);
        });
    }
    Some(server)
}

#[test]
fn init_creates_database_and_is_idempotent() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_quran(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/quran.sqlite").exists());

    let (_, _, success) = run_quran(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn verify_fails_on_empty_database() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    run_quran(&config_path, &["init"]);

    let (stdout, stderr, success) = run_quran(&config_path, &["verify"]);
    assert!(!success, "verify should fail: stdout={}", stdout);
    assert!(stderr.contains("incomplete"), "stderr: {}", stderr);
}

#[test]
fn read_rejects_out_of_range_chapter() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    for arg in ["0", "115", "x"] {
        let (_, stderr, success) = run_quran(&config_path, &["read", arg]);
        assert!(!success);
        assert!(stderr.contains("chapter"), "stderr: {}", stderr);
    }
}

#[test]
fn search_rejects_over_length_query() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let long = "a".repeat(101);
    let (_, stderr, success) = run_quran(&config_path, &["search", &long]);
    assert!(!success);
    assert!(stderr.contains("too long"), "stderr: {}", stderr);
    // Rejected before the database is opened.
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn ingest_then_query_end_to_end() {
    let Some(server) = mock_corpus() else {
        return;
    };
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) = run_quran(&config_path, &["ingest", "--progress", "off"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chapters written: 114"), "stdout: {}", stdout);
    assert!(stdout.contains("ok"));

    let (stdout, stderr, success) = run_quran(&config_path, &["verify"]);
    assert!(success, "verify failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Chapters:  114 / 114"));

    let (stdout, _, success) = run_quran(&config_path, &["chapters"]);
    assert!(success);
    assert!(stdout.contains("Surah 114"));

    let (stdout, _, success) = run_quran(&config_path, &["read", "3"]);
    assert!(success);
    assert!(stdout.contains(&format!("[3:1] {}", common::arabic(3, 1))));
    assert!(stdout.contains(&common::translation(3, 4)));

    let (stdout, _, success) = run_quran(&config_path, &["search", "marker5x1"]);
    assert!(success);
    assert!(stdout.contains("<b>marker5x1</b>"), "stdout: {}", stdout);
    assert!(stdout.contains("1 hit(s)"));

    let (stdout, _, success) = run_quran(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains(&format!("verses indexed: {}", common::total_verses())));
}

#[test]
fn ingest_keep_going_reports_skipped_chapters() {
    if TcpListener::bind("127.0.0.1:0").is_err() {
        return;
    }
    let server = MockServer::start();
    for (path, doc) in common::corpus() {
        if path == "surah/surah_20.json" {
            continue;
        }
        server.mock(|when, then| {
            when.method(GET).path(format!("/{}", path));
            then.status(200).json_body(doc);
        });
    }
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, _, success) = run_quran(&config_path, &["ingest", "--progress", "off"]);
    assert!(!success, "ingest should abort without --keep-going: {}", stdout);

    let (stdout, stderr, success) = run_quran(
        &config_path,
        &["ingest", "--keep-going", "--progress", "json"],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("chapters written: 113"));
    assert!(stdout.contains("partial"));
    assert!(stderr.contains("\"phase\":\"skipped\""), "stderr: {}", stderr);

    let (_, _, success) = run_quran(&config_path, &["verify"]);
    assert!(!success);
}

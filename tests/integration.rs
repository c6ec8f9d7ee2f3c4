//! End-to-end tests of the `rag` binary with the offline providers.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let pages = root.join("pages");
    fs::create_dir_all(&pages).unwrap();
    fs::write(
        pages.join("cameras.md"),
        "# Camera Rentals\n\nWe rent the Sony FX6 cinema camera for 150 dollars per day.\n\nEvery camera kit includes batteries and media cards.",
    )
    .unwrap();
    fs::write(
        pages.join("hours.md"),
        "# Store Hours\n\nOur store is open Monday to Friday from 9am to 6pm.\n\nWeekend pickups are by appointment.",
    )
    .unwrap();
    fs::write(
        pages.join("lighting.json"),
        r#"[{"url": "https://primesandzooms.com/lighting", "title": "Lighting", "content": "Aputure LED panels and C-stands are available for daily rental."}]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[index]
path = "{root}/data/rag.sqlite"

[chunking]
max_tokens = 120
overlap_tokens = 20

[retrieval]
top_k = 3

[embedding]
provider = "hashing"
dims = 256

[llm]
provider = "extractive"

[prompt]
business_name = "Primes and Zooms"
contact = "the store"

[corpus]
root = "{root}/pages"
base_url = "https://primesandzooms.com"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn entries_line(config_path: &Path) -> String {
    let (stdout, stderr, success) = run_rag(config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    stdout
        .lines()
        .find(|l| l.trim_start().starts_with("Entries:"))
        .unwrap_or_else(|| panic!("no Entries line in: {}", stdout))
        .trim()
        .to_string()
}

#[test]
fn test_init_creates_index() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/rag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rag(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_rag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_corpus() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents ingested: 3"), "{}", stdout);
    assert!(stdout.contains("chunks created: 3"), "{}", stdout);
    assert!(stdout.contains("ok"));
    assert_eq!(entries_line(&config_path), "Entries:     3");
}

#[test]
fn test_ingest_twice_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["ingest"]);
    let first = entries_line(&config_path);
    run_rag(&config_path, &["ingest"]);
    let second = entries_line(&config_path);
    assert_eq!(first, second);
}

#[test]
fn test_reingest_drops_stale_chunks() {
    let (tmp, config_path) = setup_test_env();
    let long: Vec<String> = (0..300).map(|i| format!("word{}", i)).collect();
    fs::write(tmp.path().join("pages/faq.txt"), long.join(" ")).unwrap();

    let (stdout, _, success) = run_rag(&config_path, &["ingest"]);
    assert!(success);
    // 300 tokens at 120/20 → 3 chunks, plus one per other page
    assert!(stdout.contains("chunks created: 6"), "{}", stdout);

    fs::write(tmp.path().join("pages/faq.txt"), "Short answer now.").unwrap();
    run_rag(&config_path, &["ingest"]);
    assert_eq!(entries_line(&config_path), "Entries:     4");
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("documents found: 3"));
    assert!(stdout.contains("estimated chunks: 3"));
    assert_eq!(entries_line(&config_path), "Entries:     0");
}

#[test]
fn test_ingest_path_override() {
    let (tmp, config_path) = setup_test_env();
    let other = tmp.path().join("other");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("returns.md"), "# Returns\n\nReturn gear by noon.").unwrap();

    let (stdout, _, success) = run_rag(
        &config_path,
        &["ingest", "--path", other.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("documents ingested: 1"), "{}", stdout);
}

#[test]
fn test_ingest_reports_malformed_file() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("pages/broken.json"), "{ not json").unwrap();

    let (stdout, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(success, "ingest should not abort: {}", stderr);
    assert!(stdout.contains("documents ingested: 3"));
    assert!(stdout.contains("failed: 1"));
    assert!(stdout.contains("broken.json"));
}

#[test]
fn test_ask_grounded_answer() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, stderr, success) =
        run_rag(&config_path, &["ask", "Do you rent the Sony FX6 cinema camera?"]);
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("Sony FX6"), "{}", stdout);
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("https://primesandzooms.com/cameras.md"));
}

#[test]
fn test_ask_stream_matches_complete() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let question = "What are your store hours on Monday?";
    let (whole, _, ok1) = run_rag(&config_path, &["ask", question]);
    let (streamed, _, ok2) = run_rag(&config_path, &["ask", question, "--stream"]);
    assert!(ok1 && ok2);
    assert_eq!(whole, streamed);
}

#[test]
fn test_ask_empty_index_says_so() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["init"]);

    let (stdout, _, success) = run_rag(&config_path, &["ask", "Do you rent drones?"]);
    assert!(success);
    assert!(stdout.contains("I don't have that specific information"));
    assert!(stdout.contains("the store"));
    assert!(!stdout.contains("Sources:"));
}

#[test]
fn test_ask_blank_question_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["ask", "   "]);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"), "{}", stderr);
}

#[test]
fn test_ask_k_zero_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_rag(&config_path, &["ask", "hours?", "--k", "0"]);
    assert!(!success);
}

#[test]
fn test_search_ranks_matching_page_first() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, _, success) = run_rag(&config_path, &["search", "Aputure LED panels", "--k", "2"]);
    assert!(success);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "{}", stdout);
    assert!(first.contains("Lighting"), "{}", stdout);
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
}

#[test]
fn test_search_empty_index() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_rag(&config_path, &["search", "cameras"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_clear_empties_index() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, _, success) = run_rag(&config_path, &["clear"]);
    assert!(success);
    assert!(stdout.contains("cleared"));
    assert_eq!(entries_line(&config_path), "Entries:     0");
}

#[test]
fn test_stats_lists_sources() {
    let (_tmp, config_path) = setup_test_env();
    run_rag(&config_path, &["ingest"]);

    let (stdout, _, success) = run_rag(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Sources:     3"));
    assert!(stdout.contains("https://primesandzooms.com/lighting"));
    assert!(stdout.contains("rental_docs"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _config_path) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(&bad, "[chunking]\nmax_tokens = 10\noverlap_tokens = 10\n").unwrap();

    let (_, stderr, success) = run_rag(&bad, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("overlap_tokens"), "{}", stderr);
}

#[test]
fn test_completions() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_rag(&config_path, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("rag"));
}

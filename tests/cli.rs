//! End-to-end tests of the `hfr` binary.

mod fixtures;

use fixtures::{Fixture, numbered_lines};
use std::path::Path;
use std::process::Command;

/// Run hfr with an isolated index directory, returning (stdout, stderr, success)
fn run_hfr(fx: &Fixture, args: &[&str]) -> (String, String, bool) {
    let index_dir = fx.index_dir();
    let config = fx.dir.path().join("config.json");
    let output = Command::new(env!("CARGO_BIN_EXE_hfr"))
        .arg("--quiet")
        .arg("--index-dir")
        .arg(&index_dir)
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("Failed to execute hfr");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn source(fx: &Fixture) -> &str {
    fx.source.to_str().expect("utf-8 temp path")
}

#[test]
fn test_open_reports_rows() {
    let fx = Fixture::new(&numbered_lines(42));
    let (out, err, ok) = run_hfr(&fx, &["open", source(&fx)]);
    assert!(ok, "open failed: {}", err);
    assert!(out.contains("Rows:     42"), "got: {}", out);
    assert!(fx.paths().exists());
}

#[test]
fn test_line_prints_numbered_rows() {
    let fx = Fixture::new(&numbered_lines(10));
    let (out, err, ok) = run_hfr(&fx, &["line", source(&fx), "3", "-n", "2"]);
    assert!(ok, "line failed: {}", err);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["3: line number 3", "4: line number 4"]);
}

#[test]
fn test_line_with_huge_count_stops_at_end() {
    let fx = Fixture::new(&numbered_lines(3));
    let (out, err, ok) = run_hfr(&fx, &["line", source(&fx), "1", "-n", &u64::MAX.to_string()]);
    assert!(ok, "line failed: {}", err);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(": line number 1"), "got: {}", out);
    assert!(lines[1].ends_with(": line number 2"), "got: {}", out);
}

#[test]
fn test_line_past_end_prints_nothing() {
    let fx = Fixture::new(b"only\n");
    let (out, _, ok) = run_hfr(&fx, &["line", source(&fx), "5"]);
    assert!(ok);
    assert!(out.is_empty(), "got: {}", out);
}

#[test]
fn test_search_found_and_not_found() {
    let fx = Fixture::new(b"cat\ndog\nCat\n");
    let (out, err, ok) = run_hfr(&fx, &["search", source(&fx), "cat", "--col", "1", "-i"]);
    assert!(ok, "search failed: {}", err);
    assert_eq!(out.trim(), "2:0: Cat");

    let (out, _, ok) = run_hfr(&fx, &["search", source(&fx), "bird"]);
    assert!(!ok);
    assert!(out.contains("Not found"));
}

#[test]
fn test_missing_file_fails() {
    let fx = Fixture::new(b"");
    let missing = fx.dir.path().join("missing.txt");
    let (_, err, ok) = run_hfr(&fx, &["open", missing.to_str().unwrap()]);
    assert!(!ok);
    assert!(err.contains("File not found"), "got: {}", err);
}

#[test]
fn test_list_stats_and_remove() {
    let fx = Fixture::new(b"a\nb\n");
    let (_, _, ok) = run_hfr(&fx, &["open", source(&fx)]);
    assert!(ok);

    let (out, _, ok) = run_hfr(&fx, &["list"]);
    assert!(ok);
    assert!(out.contains("source.txt"), "got: {}", out);

    let (out, _, ok) = run_hfr(&fx, &["stats", source(&fx)]);
    assert!(ok);
    assert!(out.contains("Rows:             2"), "got: {}", out);

    let (_, _, ok) = run_hfr(&fx, &["remove", source(&fx)]);
    assert!(ok);
    assert!(!fx.paths().exists());

    run_hfr(&fx, &["open", source(&fx)]);
    let (out, _, ok) = run_hfr(&fx, &["remove", "--all"]);
    assert!(ok);
    assert!(out.contains("Removed 2 index files"), "got: {}", out);
    assert!(!Path::new(&fx.paths().sidecar).exists());
}

#[test]
fn test_config_save_writes_effective_config() {
    let fx = Fixture::new(b"");
    let (out, err, ok) = run_hfr(&fx, &["config", "--save"]);
    assert!(ok, "config failed: {}", err);
    assert!(out.contains("cache_max_lines"), "got: {}", out);

    let saved = std::fs::read_to_string(fx.dir.path().join("config.json")).unwrap();
    assert!(saved.contains(fx.index_dir().to_str().unwrap()), "got: {}", saved);
}

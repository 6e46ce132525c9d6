//! End-to-end cache lifecycle tests: snapshot freshness, clearing,
//! bypass flags, and the latest-mode per-query entries.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn pdq_cmd(feed: &Path, cache: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pdq"));
    cmd.arg("--source").arg(feed);
    cmd.arg("--cache-dir").arg(cache);
    cmd.env("PDQ_LOG", "error");
    cmd.env("FORMAT", "text");
    cmd.env("XDG_CONFIG_HOME", cache);
    cmd.env("XDG_CACHE_HOME", cache);
    cmd
}

fn write_feed(dir: &Path, name: &str) {
    fs::write(
        dir.join(name),
        concat!(
            r#"{"fmri": "a/app@1.0", "depends": [{"fmri": "b/lib@1.0", "type": "require"}]}"#,
            "\n",
            r#"{"fmri": "b/lib@1.0", "depends": []}"#,
            "\n",
        ),
    )
    .expect("write feed file");
}

fn status_json(feed: &Path, cache: &Path) -> Value {
    let output = pdq_cmd(feed, cache)
        .args(["cache", "status", "--json"])
        .output()
        .expect("cache status should not crash");
    assert!(
        output.status.success(),
        "cache status failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("cache status --json must parse")
}

// ── snapshot lifecycle ──────────────────────────────────────────────────────

#[test]
fn status_missing_then_fresh_after_a_query() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    assert_eq!(status_json(feed.path(), cache.path())["state"], "missing");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app"])
        .assert()
        .success();

    let status = status_json(feed.path(), cache.path());
    assert_eq!(status["state"], "fresh");
    assert_eq!(status["records"], 2);
    assert!(status["written_at"].is_string());
}

#[test]
fn status_goes_stale_when_the_feed_changes() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app"])
        .assert()
        .success();

    // A new feed file changes the directory fingerprint.
    write_feed(feed.path(), "more.jsonl");
    assert_eq!(status_json(feed.path(), cache.path())["state"], "stale");
}

#[test]
fn clear_removes_the_snapshot() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app"])
        .assert()
        .success();
    assert_eq!(status_json(feed.path(), cache.path())["state"], "fresh");

    pdq_cmd(feed.path(), cache.path())
        .args(["cache", "clear"])
        .assert()
        .success();
    assert_eq!(status_json(feed.path(), cache.path())["state"], "missing");
}

#[test]
fn no_cache_never_writes_a_snapshot() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args(["--no-cache", "depends", "a/app"])
        .assert()
        .success();
    assert_eq!(status_json(feed.path(), cache.path())["state"], "missing");
}

#[test]
fn corrupt_snapshot_recovers_by_rebuilding() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");
    fs::write(cache.path().join("catalog.json"), "{ definitely not a snapshot")
        .expect("write garbage snapshot");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("b/lib@1.0"));

    // The query healed the snapshot.
    assert_eq!(status_json(feed.path(), cache.path())["state"], "fresh");
}

#[test]
fn force_cache_reuses_a_stale_snapshot() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app"])
        .assert()
        .success();

    // Replace the feed with one that no longer contains a/app: a forced
    // load must still answer from the stale snapshot.
    fs::remove_file(feed.path().join("feed.jsonl")).expect("remove feed file");
    fs::write(feed.path().join("other.jsonl"), "{\"fmri\": \"c/new@1.0\"}\n")
        .expect("write replacement feed");

    pdq_cmd(feed.path(), cache.path())
        .args(["--force-cache", "depends", "a/app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a/app@1.0"));
}

// ── latest mode ─────────────────────────────────────────────────────────────

#[test]
fn latest_mode_stores_one_entry_per_query() {
    let feed = TempDir::new().expect("feed dir");
    let catalog = TempDir::new().expect("catalog dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");
    write_feed(catalog.path(), "catalog.jsonl");

    let run = |pkg: &str, extra: &[&str]| {
        let mut args = vec!["depends", pkg, "--latest", "--catalog"];
        args.push(catalog.path().to_str().expect("utf8 path"));
        args.extend_from_slice(extra);
        pdq_cmd(feed.path(), cache.path())
            .args(&args)
            .assert()
            .success()
            .stdout(predicate::str::contains("b/lib@1.0"));
    };

    run("a/app", &[]);
    let status = status_json(feed.path(), cache.path());
    assert_eq!(status["latest_entries"], 1);

    // Same query again: served from the entry, count unchanged.
    run("a/app", &[]);
    assert_eq!(status_json(feed.path(), cache.path())["latest_entries"], 1);

    // Different key (recursion over a fully versioned package) digests to
    // a different entry.
    run("a/app@1.0", &["--recurse"]);
    assert_eq!(status_json(feed.path(), cache.path())["latest_entries"], 2);
}

#[test]
fn cache_clear_removes_latest_entries_too() {
    let feed = TempDir::new().expect("feed dir");
    let catalog = TempDir::new().expect("catalog dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");
    write_feed(catalog.path(), "catalog.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args([
            "depends",
            "a/app",
            "--latest",
            "--catalog",
            catalog.path().to_str().expect("utf8 path"),
        ])
        .assert()
        .success();
    assert_eq!(status_json(feed.path(), cache.path())["latest_entries"], 1);

    pdq_cmd(feed.path(), cache.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 latest entry removed"));
    assert_eq!(status_json(feed.path(), cache.path())["latest_entries"], 0);
}

#[test]
fn latest_without_a_catalog_is_an_option_error() {
    let feed = TempDir::new().expect("feed dir");
    let cache = TempDir::new().expect("cache dir");
    write_feed(feed.path(), "feed.jsonl");

    pdq_cmd(feed.path(), cache.path())
        .args(["depends", "a/app", "--latest", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));
}

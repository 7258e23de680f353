//! E2E CLI tests for the archival trigger:
//! - `larder init` store and config bootstrap
//! - `larder archive` JSON contract, archive files on disk, hot-store pruning
//! - dry run and provider filtering
//! - top-level failures (missing store, bad provider)
//! - `larder stale` read-only preview
//!
//! Each test runs the `larder` binary as a subprocess in an isolated temp
//! directory. The hot store is seeded in-process through `larder-core`.

use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use larder_core::archive::decode_archive;
use larder_core::model::{AggregatedRecord, Provider, RawRecord, RecordId};
use larder_core::store::SqliteHotStore;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the larder binary, rooted in `dir`.
fn larder_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("larder"));
    cmd.current_dir(dir);
    cmd.env("LARDER_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn init_project(dir: &Path) {
    larder_cmd(dir).args(["init"]).assert().success();
}

fn store_path(dir: &Path) -> PathBuf {
    dir.join(".larder/hot.sqlite3")
}

fn archive_dir(dir: &Path) -> PathBuf {
    dir.join(".larder/archive")
}

fn raw(provider: Provider, id: &str, endpoint: Option<&str>, location: &str, month: u32) -> RawRecord {
    RawRecord {
        id: RecordId::new(id),
        provider,
        endpoint: endpoint.map(str::to_string),
        location: Some(location.to_string()),
        timestamp: Utc.with_ymd_and_hms(2020, month, 10, 9, 30, 0).unwrap(),
        payload: json!({"source": id, "amount": 42}),
    }
}

/// Two bork partitions, one eitje partition, one bork aggregate, and one
/// record fresh enough to survive any retention window.
fn seed(dir: &Path) {
    let store = SqliteHotStore::open(&store_path(dir)).unwrap();
    for i in 0..4 {
        store
            .insert_raw(&raw(Provider::Bork, &format!("b-a-{i}"), None, "loc-a", 3))
            .unwrap();
    }
    for i in 0..2 {
        store
            .insert_raw(&raw(Provider::Bork, &format!("b-b-{i}"), None, "loc-b", 4))
            .unwrap();
    }
    for i in 0..3 {
        store
            .insert_raw(&raw(Provider::Eitje, &format!("e-{i}"), Some("shifts"), "loc-a", 3))
            .unwrap();
    }

    let mut fresh = raw(Provider::Bork, "fresh", None, "loc-a", 1);
    fresh.timestamp = Utc::now();
    store.insert_raw(&fresh).unwrap();

    store
        .insert_aggregate(
            Provider::Bork,
            &AggregatedRecord {
                id: RecordId::new("agg-march"),
                location: "loc-a".to_string(),
                date: Utc.with_ymd_and_hms(2020, 3, 15, 0, 0, 0).unwrap(),
                payload: json!({"revenue": 1200}),
            },
        )
        .unwrap();
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = larder_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("larder should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn archive_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(archive_dir(dir)) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".json.gz"))
        .collect();
    names.sort();
    names
}

fn stats_for<'a>(report: &'a Value, provider: &str) -> &'a Value {
    report["stats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["provider"] == provider)
        .unwrap_or_else(|| panic!("no stats for {provider}"))
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store_archive_dir_and_config() {
    let dir = TempDir::new().unwrap();
    let out = run_json(dir.path(), &["init"]);

    assert_eq!(out["schema_version"], 2);
    assert!(store_path(dir.path()).exists());
    assert!(archive_dir(dir.path()).is_dir());
    assert!(dir.path().join("larder.toml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());
    init_project(dir.path());

    let store = SqliteHotStore::open_existing(&store_path(dir.path())).unwrap();
    assert_eq!(store.count_raw(Provider::Bork).unwrap(), 7);
}

// ---------------------------------------------------------------------------
// archive
// ---------------------------------------------------------------------------

#[test]
fn archive_writes_partition_files_and_prunes_store() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    let report = run_json(dir.path(), &["archive"]);
    assert_eq!(report["success"], true);
    assert_eq!(report["dryRun"], false);
    assert_eq!(report["monthsToKeep"], 1);
    assert!(report["totalSpaceFreedMB"].is_number());

    let bork = stats_for(&report, "bork");
    assert_eq!(bork["recordsFound"], 6);
    assert_eq!(bork["recordsArchived"], 6);
    assert_eq!(bork["recordsDeleted"], 6);
    assert_eq!(bork["totalSizeAfter"], 0);
    assert_eq!(bork["errors"], json!([]));

    let eitje = stats_for(&report, "eitje");
    assert_eq!(eitje["recordsArchived"], 3);

    assert_eq!(
        archive_files(dir.path()),
        vec![
            "bork-loc-a-2020-03.json.gz",
            "bork-loc-b-2020-04.json.gz",
            "eitje-shifts-loc-a-2020-03.json.gz",
        ]
    );

    let store = SqliteHotStore::open_existing(&store_path(dir.path())).unwrap();
    assert_eq!(store.count_raw(Provider::Bork).unwrap(), 1);
    assert!(store.contains_raw(Provider::Bork, &RecordId::new("fresh")).unwrap());
    assert_eq!(store.count_raw(Provider::Eitje).unwrap(), 0);
    assert_eq!(store.count_aggregates(Provider::Bork).unwrap(), 1);

    let name = "bork-loc-a-2020-03.json.gz";
    let bytes = std::fs::read(archive_dir(dir.path()).join(name)).unwrap();
    let doc = decode_archive(name, &bytes).unwrap();
    assert_eq!(doc.raw_data.len(), 4);
    assert_eq!(doc.aggregated_data.len(), 1);
    assert_eq!(doc.metadata.location, "loc-a");
}

#[test]
fn second_run_finds_nothing() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    run_json(dir.path(), &["archive"]);
    let again = run_json(dir.path(), &["archive"]);

    for provider in ["bork", "eitje"] {
        let stats = stats_for(&again, provider);
        assert_eq!(stats["recordsFound"], 0);
        assert_eq!(stats["archiveFiles"], json!([]));
    }
    assert_eq!(archive_files(dir.path()).len(), 3);
}

#[test]
fn dry_run_reports_without_side_effects() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    let report = run_json(dir.path(), &["archive", "--dry-run"]);
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["totalSpaceFreedMB"], 0.0);

    let bork = stats_for(&report, "bork");
    assert_eq!(bork["recordsFound"], 6);
    assert_eq!(bork["recordsArchived"], 0);
    assert_eq!(bork["recordsDeleted"], 0);
    assert_eq!(bork["totalSizeBefore"], bork["totalSizeAfter"]);

    assert!(archive_files(dir.path()).is_empty());
    let store = SqliteHotStore::open_existing(&store_path(dir.path())).unwrap();
    assert_eq!(store.count_raw(Provider::Bork).unwrap(), 7);
    assert_eq!(store.count_raw(Provider::Eitje).unwrap(), 3);
}

#[test]
fn provider_filter_limits_run() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    let report = run_json(dir.path(), &["archive", "--provider", "eitje"]);
    let stats = report["stats"].as_array().unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0]["provider"], "eitje");

    assert_eq!(
        archive_files(dir.path()),
        vec!["eitje-shifts-loc-a-2020-03.json.gz"]
    );
    let store = SqliteHotStore::open_existing(&store_path(dir.path())).unwrap();
    assert_eq!(store.count_raw(Provider::Bork).unwrap(), 7);
}

#[test]
fn months_flag_overrides_config() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    let report = run_json(dir.path(), &["archive", "--dry-run", "--months", "4"]);
    assert_eq!(report["monthsToKeep"], 4);
}

#[test]
fn config_months_are_used_by_default() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("larder.toml"),
        "[archive]\nmonths_to_keep = 6\n",
    )
    .unwrap();
    init_project(dir.path());

    let report = run_json(dir.path(), &["archive", "--dry-run"]);
    assert_eq!(report["monthsToKeep"], 6);
}

#[test]
fn missing_store_is_a_top_level_failure() {
    let dir = TempDir::new().unwrap();

    let output = larder_cmd(dir.path())
        .args(["archive", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).expect("failure body is JSON");
    assert_eq!(body["success"], false);
    assert_eq!(body["stats"], json!([]));
    assert!(body["error"].as_str().unwrap().starts_with("E2001"));
}

#[test]
fn missing_store_in_text_mode_reports_on_stderr() {
    let dir = TempDir::new().unwrap();

    larder_cmd(dir.path())
        .args(["archive", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"))
        .stderr(predicate::str::contains("larder init"));
}

#[test]
fn dry_run_against_uninitialized_store_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = store_path(dir.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"").unwrap();

    let output = larder_cmd(dir.path())
        .args(["archive", "--dry-run", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let body: Value = serde_json::from_slice(&output.stdout).expect("failure body is JSON");
    assert!(body["error"].as_str().unwrap().starts_with("E2001"));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    assert!(!path.with_extension("sqlite3-wal").exists());
}

#[test]
fn unknown_provider_is_rejected_by_argument_parser() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());

    larder_cmd(dir.path())
        .args(["archive", "--provider", "toast"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown provider"));
}

#[test]
fn broken_config_fails_before_touching_store() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("larder.toml"), "[archive\nmonths = ").unwrap();

    let output = larder_cmd(dir.path())
        .args(["archive", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("E1001"));
}

// ---------------------------------------------------------------------------
// stale
// ---------------------------------------------------------------------------

#[test]
fn stale_previews_without_archiving() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    let report = run_json(dir.path(), &["stale"]);
    let providers = report["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);

    let bork = &providers[0];
    assert_eq!(bork["provider"], "bork");
    assert_eq!(bork["records"], 6);
    assert_eq!(
        bork["partitions"],
        json!(["bork/loc-a/2020-03", "bork/loc-b/2020-04"])
    );

    assert!(archive_files(dir.path()).is_empty());
}

#[test]
fn stale_text_output_is_line_oriented() {
    let dir = TempDir::new().unwrap();
    init_project(dir.path());
    seed(dir.path());

    larder_cmd(dir.path())
        .args(["stale", "--provider", "bork", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("provider=bork records=6 partitions=2"));
}

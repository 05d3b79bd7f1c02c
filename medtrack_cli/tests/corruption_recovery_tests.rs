//! Corruption recovery tests for medtrack.
//!
//! These tests verify that:
//! - Corrupt ledger lines are tolerated without losing the rest of the log
//! - A corrupt trigger store degrades to empty rather than crashing
//! - A corrupt record collection surfaces an error instead of wiping data

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

const NOW: &str = "2024-03-01T07:00:00Z";
const START: &str = "2024-03-01T08:00:00Z";

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn cli() -> Command {
    Command::cargo_bin("medtrack").expect("Failed to find medtrack binary")
}

fn add_medication(data_dir: &Path) {
    cli()
        .args(["add", "--name", "Amoxicillin", "--dosage", "500 mg"])
        .args(["--every", "8", "--days", "1"])
        .args(["--start", START])
        .args(["--now", NOW])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success();
}

#[test]
fn test_corrupt_ledger_line_does_not_lose_other_entries() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    add_medication(data_dir);

    cli()
        .args(["take", "Amoxicillin", "--slot", START])
        .args(["--now", "2024-03-01T08:01:00Z"])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success();

    // Inject a junk line into the ledger
    {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(data_dir.join("dose_log.jsonl"))
            .unwrap();
        file.write_all(b"### corrupted line ###\n").unwrap();
    }

    // The taken dose is still visible and progress still counts it
    cli()
        .arg("progress")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/3 doses logged"));

    // The next write compacts the junk away
    cli()
        .args(["skip", "Amoxicillin", "--slot", "2024-03-01T16:00:00Z"])
        .args(["--now", "2024-03-01T16:10:00Z"])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success();

    let ledger = fs::read_to_string(data_dir.join("dose_log.jsonl")).unwrap();
    assert!(!ledger.contains("corrupted"));
    assert_eq!(ledger.lines().count(), 2);
}

#[test]
fn test_corrupt_trigger_store_degrades_to_empty() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    add_medication(data_dir);

    fs::write(data_dir.join("triggers.json"), "{ not json }").unwrap();

    // Resync treats the corrupt store as empty and rebuilds it
    cli()
        .args(["remind", "--now", NOW])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled 3 reminder triggers"));

    let triggers = fs::read_to_string(data_dir.join("triggers.json")).unwrap();
    assert_eq!(triggers.matches("dose-v1-").count(), 3);
}

#[test]
fn test_corrupt_medications_collection_surfaces_error() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    add_medication(data_dir);

    fs::write(data_dir.join("medications.json"), "{ not json }").unwrap();

    // A failed read must not look like success or wipe the file
    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure();

    let contents = fs::read_to_string(data_dir.join("medications.json")).unwrap();
    assert_eq!(contents, "{ not json }");
}

#[test]
fn test_failed_dose_log_reports_failure() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    add_medication(data_dir);

    // Corrupt collection makes the medication lookup fail before any write
    fs::write(data_dir.join("medications.json"), "{ not json }").unwrap();

    let assert = cli()
        .args(["take", "Amoxicillin", "--slot", START])
        .args(["--now", "2024-03-01T08:01:00Z"])
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .failure();

    // No success message and no ledger entry was written
    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Dose logged"));
    assert!(!data_dir.join("dose_log.jsonl").exists());
}

#[test]
fn test_sequential_writes_preserve_all_entries() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    add_medication(data_dir);

    let slots = [
        "2024-03-01T08:00:00Z",
        "2024-03-01T16:00:00Z",
        "2024-03-02T00:00:00Z",
    ];
    for slot in slots {
        cli()
            .args(["take", "Amoxicillin", "--slot", slot])
            .args(["--now", "2024-03-02T01:00:00Z"])
            .arg("--data-dir")
            .arg(data_dir)
            .assert()
            .success();
    }

    let ledger = fs::read_to_string(data_dir.join("dose_log.jsonl")).unwrap();
    assert_eq!(ledger.lines().count(), 3);

    cli()
        .arg("progress")
        .arg("--data-dir")
        .arg(data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("3/3 doses logged (100.0%)"))
        .stdout(predicate::str::contains("completed"));
}

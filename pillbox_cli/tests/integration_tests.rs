//! Integration tests for the pillbox binary.
//!
//! These tests verify end-to-end behavior including:
//! - Account signup and share codes
//! - Medication CRUD with schedule replacement
//! - Daily log materialization and dose transitions
//! - Caregiver linking and the dashboard
//! - Label scanning through a configured extractor

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pillbox"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("no-config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

/// Sign up and return the printed share code
fn signup(data_dir: &Path, name: &str, email: &str, role: &str) -> String {
    let output = cli(data_dir)
        .args(["signup", "--name", name, "--email", email, "--role", role])
        .output()
        .expect("Failed to run signup");
    assert!(output.status.success(), "signup failed: {:?}", output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Share code: "))
        .expect("No share code printed")
        .to_string()
}

fn today_json(data_dir: &Path, email: &str) -> Value {
    let output = cli(data_dir)
        .args(["--user", email, "today", "--json"])
        .output()
        .expect("Failed to run today");
    assert!(output.status.success(), "today failed: {:?}", output);
    serde_json::from_slice(&output.stdout).expect("today --json is not JSON")
}

/// Log id of the first entry in the group for `time`
fn log_id_at(report: &Value, time: &str) -> String {
    report["summary"]["groups"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["time_of_day"] == time)
        .and_then(|g| g["entries"][0]["log_id"].as_str())
        .expect("No log for time of day")
        .to_string()
}

fn group_names(report: &Value) -> Vec<String> {
    report["summary"]["groups"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["time_of_day"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("pillbox"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Medication schedule and adherence tracker",
        ));
}

#[test]
fn test_signup_creates_database() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let code = signup(data_dir, "Ana", "ana@example.com", "patient");

    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert!(data_dir.join("pillbox.json").exists());
}

#[test]
fn test_duplicate_email_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["signup", "--name", "Other", "--email", "ANA@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has already been taken"));
}

#[test]
fn test_commands_require_user() {
    let temp_dir = setup_test_dir();

    cli(temp_dir.path())
        .arg("today")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--user <email> is required"));
}

#[test]
fn test_daily_adherence_flow() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let code = signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin"])
        .args(["--dosage", "500mg", "--time", "evening", "--time", "morning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved Metformin"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["share_code"], code.as_str());
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["taken"], 0);
    assert_eq!(group_names(&report), vec!["morning", "evening"]);

    let morning = log_id_at(&report, "morning");
    cli(data_dir)
        .args(["--user", "ana@example.com", "take", &morning])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marked as taken"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["taken"], 1);
    assert_eq!(report["summary"]["percentage"], 50.0);

    cli(data_dir)
        .args(["--user", "ana@example.com", "untake", &morning])
        .assert()
        .success();

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["summary"]["taken"], 0);
    assert_eq!(log_id_at(&report, "morning"), morning);
}

#[test]
fn test_today_human_output() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "today"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0/0 taken (0%)"))
        .stdout(predicate::str::contains("No medications yet"));
}

#[test]
fn test_add_validation_errors() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please select at least one time"));

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin", "--time", "noon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("noon is not a valid time of day"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["medications"].as_array().unwrap().len(), 0);
}

#[test]
fn test_edit_replaces_schedule() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin"])
        .args(["--time", "morning", "--time", "evening"])
        .assert()
        .success();

    let report = today_json(data_dir, "ana@example.com");
    let medication_id = report["medications"][0]["medication"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let morning = log_id_at(&report, "morning");
    cli(data_dir)
        .args(["--user", "ana@example.com", "take", &morning])
        .assert()
        .success();

    cli(data_dir)
        .args(["--user", "ana@example.com", "edit", &medication_id])
        .args(["--name", "Metformin XR", "--time", "morning", "--time", "afternoon"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Metformin XR (morning, afternoon)"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(group_names(&report), vec!["morning", "afternoon"]);
    assert_eq!(report["summary"]["total"], 2);
    assert_eq!(report["summary"]["taken"], 1);
    assert_eq!(log_id_at(&report, "morning"), morning);

    cli(data_dir)
        .args(["--user", "ana@example.com", "remove", &medication_id])
        .assert()
        .success();

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["summary"]["total"], 0);
}

#[test]
fn test_cannot_take_someone_elses_dose() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");
    signup(data_dir, "Eve", "eve@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin", "--time", "morning"])
        .assert()
        .success();
    let morning = log_id_at(&today_json(data_dir, "ana@example.com"), "morning");

    cli(data_dir)
        .args(["--user", "eve@example.com", "take", &morning])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NotFound"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["summary"]["taken"], 0);
}

#[test]
fn test_caregiver_dashboard() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let code = signup(data_dir, "Ana", "ana@example.com", "patient");
    signup(data_dir, "Bo", "bo@example.com", "caregiver");

    cli(data_dir)
        .args(["--user", "ana@example.com", "add", "--name", "Metformin"])
        .args(["--time", "morning", "--time", "evening"])
        .assert()
        .success();

    cli(data_dir)
        .args(["--user", "bo@example.com", "link", &code])
        .assert()
        .success()
        .stdout(predicate::str::contains("Linked to Ana"));

    cli(data_dir)
        .args(["--user", "bo@example.com", "link", &code])
        .assert()
        .failure()
        .stderr(predicate::str::contains("You are already linked to this patient"));

    // Dashboard materializes the patient's logs even if they never opened today
    cli(data_dir)
        .args(["--user", "bo@example.com", "patients"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ana:"))
        .stdout(predicate::str::contains("0/2 taken (0%)"));

    let output = cli(data_dir)
        .args(["--user", "bo@example.com", "patients", "--json"])
        .output()
        .unwrap();
    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["patient_name"], "Ana");
    assert_eq!(rows[0]["summary"]["total"], 2);
}

#[test]
fn test_link_errors() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let code = signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "link", &code])
        .assert()
        .failure()
        .stderr(predicate::str::contains("You cannot link to yourself"));

    let unknown = if code == "100000" { "100001" } else { "100000" };
    cli(data_dir)
        .args(["--user", "ana@example.com", "link", unknown])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Code not found"));
}

#[test]
fn test_delete_account() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "delete-account"])
        .assert()
        .success();

    cli(data_dir)
        .args(["--user", "ana@example.com", "today"])
        .assert()
        .failure();

    // Email is free again
    signup(data_dir, "Ana", "ana@example.com", "patient");
}

#[test]
fn test_scan_without_extractor_degrades() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    let image = data_dir.join("label.jpg");
    fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

    cli(data_dir)
        .args(["--user", "ana@example.com", "scan", "--image"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Could not process image. Please enter details manually.",
        ));

    // The empty guess cannot be saved
    cli(data_dir)
        .args(["--user", "ana@example.com", "scan", "--time", "morning", "--image"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("can't be blank"));
}

#[test]
fn test_scan_requires_image() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    cli(data_dir)
        .args(["--user", "ana@example.com", "scan", "--image"])
        .arg(data_dir.join("missing.jpg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please capture an image"));
}

#[cfg(unix)]
#[test]
fn test_scan_with_configured_extractor() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    signup(data_dir, "Ana", "ana@example.com", "patient");

    let config_path = data_dir.join("config.toml");
    fs::write(
        &config_path,
        r#"
[scan]
command = ["sh", "-c", "echo 'Label says: {\"name\": \"Ibuprofen\", \"dosage\": \"200mg\"}'", "extractor"]
"#,
    )
    .unwrap();

    let image = data_dir.join("label.jpg");
    fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

    cli(data_dir)
        .arg("--config")
        .arg(&config_path)
        .args(["--user", "ana@example.com", "scan", "--time", "evening", "--image"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ibuprofen"))
        .stdout(predicate::str::contains("Saved Ibuprofen (evening)"));

    let report = today_json(data_dir, "ana@example.com");
    assert_eq!(report["medications"][0]["medication"]["dosage"], "200mg");
    assert_eq!(report["summary"]["total"], 1);
}

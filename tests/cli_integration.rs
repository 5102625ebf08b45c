//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

/// Get the binary to test.
fn config_bridge() -> Command {
    Command::cargo_bin("config-bridge").unwrap()
}

/// A settings file with the passthrough attributes filled in.
fn settings_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[server]\nabort_on_cancel = false\n\n[passthrough]\nattributes = [\"memory\", \"cpus\", \"box\"]"
    )
    .unwrap();
    file
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    config_bridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Config plugin bridge"));
}

#[test]
fn test_version_flag() {
    config_bridge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_serve_help() {
    config_bridge()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stdin/stdout"));
}

#[test]
fn test_missing_subcommand_fails() {
    config_bridge().assert().failure();
}

// ============================================================================
// Settings Command Tests
// ============================================================================

#[test]
fn test_settings_shows_file_contents() {
    let file = settings_file();
    config_bridge()
        .arg("settings")
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("abort_on_cancel = false"))
        .stdout(predicate::str::contains("\"box\""));
}

#[test]
fn test_settings_path() {
    config_bridge()
        .args(["settings", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config-bridge"));
}

#[test]
fn test_bad_settings_file_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nabort_on_cancel = \"sometimes\"").unwrap();

    config_bridge()
        .arg("settings")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load settings"));
}

// ============================================================================
// Serve Command Tests
// ============================================================================

#[test]
fn test_serve_exits_when_stdin_closes() {
    let file = settings_file();
    config_bridge().arg("serve").arg("--config").arg(file.path()).write_stdin("").assert().success();
}

#[test]
fn test_serve_answers_garbage_with_parse_error() {
    let file = settings_file();
    config_bridge()
        .arg("serve")
        .arg("--config")
        .arg(file.path())
        .write_stdin("not json\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("-32700"));
}

#[test]
fn test_serve_answers_unknown_method() {
    let file = settings_file();
    config_bridge()
        .arg("serve")
        .arg("--config")
        .arg(file.path())
        .write_stdin("{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ConfigExplode\"}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\":7"))
        .stdout(predicate::str::contains("-32601"));
}

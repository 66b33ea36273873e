//! Integration tests for CLI argument parsing and the binary's non-capture
//! flags, spawning the built `parkranger` binary as a subprocess the way
//! the teacher's own `tests/test_cli_args.rs` exercises `prtip`.

use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_parkranger"))
        .args(args)
        .output()
        .expect("failed to execute parkranger binary")
}

#[test]
fn help_flag_prints_usage() {
    let output = run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("--interface"));
    assert!(stdout.contains("--ports"));
}

#[test]
fn version_flag_prints_version() {
    let output = run(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("parkranger"));
}

#[test]
fn list_interfaces_does_not_require_privileges() {
    // --list-interfaces short-circuits before the capture device is opened,
    // so it must succeed even when the test runner isn't root.
    let output = run(&["--list-interfaces"]);
    assert!(output.status.success());
}

#[test]
fn unknown_flag_is_a_parse_error_not_a_panic() {
    let output = run(&["--not-a-real-flag"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unexpected argument") || stderr.contains("error"));
}

#[test]
fn missing_config_file_is_reported_as_a_context_error() {
    let output = run(&["--config", "/nonexistent/parkranger-test-config.toml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config"));
}

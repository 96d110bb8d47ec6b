//! Integration tests for the `lifeline` binary

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_lifeline"))
        .arg("--quiet")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_roots_command_prints_both_roots() {
    let output = run(&["roots"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["background", "todo"]);
}

#[test]
fn test_values_command_prints_tree() {
    let output = run(&["values"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("background.with_value(b, \"B\").with_value(d, \"D\")"));
    assert!(stdout.contains("f.value(\"f\") = \"F\""));
}

#[test]
fn test_leak_command_reports_leak() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("fast.toml");
    fs::write(&path, "[publisher]\ninterval_ms = 5\ngrace_ms = 50\nstop_after = 3\n").unwrap();

    let output = run(&["--config", path.to_str().unwrap(), "leak"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("counter 3"));
    assert!(stdout.contains("LEAK: 1 publisher(s) still alive"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[publisher]\ninterval_ms = 0\n").unwrap();

    let output = run(&["--config", path.to_str().unwrap(), "roots"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Configuration error"));
}

//! CLI integration tests for sql-migrator.
//!
//! These tests verify argument parsing, help output, exit codes and a full
//! migration cycle against a temporary SQLite database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the sql-migrator binary.
fn cmd() -> Command {
    Command::cargo_bin("sql-migrator").unwrap()
}

/// Write a config with one SQLite alias `main` inside `dir`.
fn sqlite_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("config.yaml");
    let yaml = format!(
        "migrations:\n  dir: {}\nconnections:\n  main:\n    type: sqlite\n    filename: {}\n",
        dir.path().join("migrations").display(),
        dir.path().join("main.db").display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Command with `--config` pointing at `config`.
fn with_config(config: &Path) -> Command {
    let mut c = cmd();
    c.args(["--config", config.to_str().unwrap(), "--verbosity", "error"]);
    c
}

fn write_change(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("change.yaml");
    std::fs::write(
        &path,
        "op: create_table\n\
         table:\n  \
           name: t\n  \
           primary_key: [id]\n  \
           columns:\n    \
             - name: id\n      data_type: integer\n      primary_key: true\n      required: true\n      auto_increment: true\n    \
             - name: name\n      data_type: varchar\n      precision: \"50\"\n",
    )
    .unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    let output = cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in [
        "init", "clean", "create", "list", "up", "down", "delete", "to-sql", "introspect", "plan",
        "apply", "health-check",
    ] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_up_subcommand_help() {
    cmd()
        .args(["up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--steps"))
        .stdout(predicate::str::contains("--until"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sql-migrator"));
}

#[test]
fn test_global_flags_and_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_steps_conflicts_with_until() {
    cmd()
        .args(["up", "main", "--steps", "1", "--until", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors
// =============================================================================

#[test]
fn test_missing_config_exits_with_io_code() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_sqlite_without_filename_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connections:").unwrap();
    writeln!(file, "  main:").unwrap();
    writeln!(file, "    type: sqlite").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("connections.main.filename"));
}

#[test]
fn test_unknown_alias_exits_with_code_2() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    with_config(&config)
        .args(["create", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown alias"));
}

#[test]
fn test_clean_requires_force() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    with_config(&config)
        .args(["clean", "main"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--force"));
}

// =============================================================================
// SQLite Lifecycle Tests
// =============================================================================

#[test]
fn test_init_health_check_and_clean() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);

    with_config(&config)
        .args(["init", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));
    assert!(dir.path().join("main.db").exists());

    with_config(&config)
        .arg("health-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("main (sqlite): OK"))
        .stdout(predicate::str::contains("Overall: HEALTHY"));

    with_config(&config)
        .args(["clean", "main", "--force"])
        .assert()
        .success();
    assert!(!dir.path().join("main.db").exists());
}

#[test]
fn test_apply_introspect_and_revert() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let change = write_change(&dir);

    with_config(&config)
        .args(["plan", "main", change.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE \"t\""))
        .stdout(predicate::str::contains("DROP TABLE \"t\""));

    with_config(&config)
        .args(["apply", "main", change.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied table_create on 'main'"));

    let output = with_config(&config)
        .args(["--output-json", "introspect", "main", "t"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schema["columns"].as_array().unwrap().len(), 2);
    assert_eq!(schema["columns"][0]["auto_increment"], true);
    assert_eq!(schema["columns"][1]["precision"], "50");

    with_config(&config)
        .args(["list", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[x]"))
        .stdout(predicate::str::contains("Pending: 0"));

    with_config(&config)
        .args(["down", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 1 migration(s)"));

    with_config(&config)
        .args(["introspect", "main", "t"])
        .assert()
        .code(4);
}

#[test]
fn test_create_to_sql_and_delete() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);

    let output = with_config(&config)
        .args(["--output-json", "create", "main"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let unit: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let title = unit["title"].as_str().unwrap().to_string();
    assert!(title.ends_with(".up.sql"));
    assert!(dir.path().join("migrations/main").join(&title).exists());

    with_config(&config)
        .args(["to-sql", "main", &title])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- up"))
        .stdout(predicate::str::contains("-- down"));

    with_config(&config)
        .args(["up", "main", "--until", "20000101_000000000_zzzzzz.up.sql"])
        .assert()
        .code(7);

    with_config(&config)
        .args(["delete", "main", &title])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted"));

    with_config(&config)
        .args(["to-sql", "main", &title])
        .assert()
        .code(7);
}

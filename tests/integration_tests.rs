//! Integration tests for the agentboard CLI surface.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create an agentboard Command isolated from the host env.
fn agentboard(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("agentboard");
    cmd.current_dir(dir.path())
        .env_remove("BOARD_API_URL")
        .env_remove("BOARD_API_TOKEN")
        .env_remove("PRIMARY_LLM_KEY")
        .env_remove("FALLBACK_LLM_KEY")
        .env("DATA_DIR", dir.path())
        .env("AGENTS_FILE", dir.path().join("agents.json"));
    cmd
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[test]
fn test_help() {
    let dir = temp_dir();
    agentboard(&dir).arg("--help").assert().success();
}

#[test]
fn test_version() {
    let dir = temp_dir();
    agentboard(&dir).arg("--version").assert().success();
}

#[test]
fn test_agents_without_registry_shows_builtin() {
    let dir = temp_dir();
    agentboard(&dir)
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("claude"))
        .stdout(predicate::str::contains("450"));
}

#[test]
fn test_agents_lists_registry_file() {
    let dir = temp_dir();
    std::fs::write(
        dir.path().join("agents.json"),
        r#"[
            {"id": "claude", "cmd": "claude", "args": ["-p", "{prompt}"], "keywords": ["implement"], "ramMB": 450, "default": true},
            {"id": "goose", "cmd": "goose", "args": ["run", "{prompt}"], "enabled": false}
        ]"#,
    )
    .unwrap();

    agentboard(&dir)
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("claude"))
        .stdout(predicate::str::contains("goose"))
        .stdout(predicate::str::contains("implement"));
}

#[test]
fn test_agents_with_broken_registry_falls_back() {
    let dir = temp_dir();
    std::fs::write(dir.path().join("agents.json"), "{ not json").unwrap();

    agentboard(&dir)
        .arg("agents")
        .assert()
        .success()
        .stdout(predicate::str::contains("claude"))
        .stderr(predicate::str::contains("built-in"));
}

#[test]
fn test_board_on_fresh_data_dir_is_empty() {
    let dir = temp_dir();
    agentboard(&dir)
        .arg("board")
        .assert()
        .success()
        .stdout(predicate::str::contains("Board is empty."));
}

#[test]
fn test_board_shows_columns_and_meta_status() {
    let dir = temp_dir();
    std::fs::write(
        dir.path().join("board.json"),
        r#"{
            "columns": [
                {"id": "1", "title": "Queue", "tasks": [
                    {"id": "t1", "title": "implement login", "description": "add OAuth", "color": 1, "createdAt": "2026-01-01T00:00:00Z"}
                ]},
                {"id": "2", "title": "Review", "tasks": [
                    {"id": "t2", "title": "old task", "description": "done\n\n---agent-meta---\n{\"agent\":\"claude\",\"status\":\"review\",\"attempts\":1,\"lastError\":null}", "color": 0, "createdAt": "2026-01-01T00:00:00Z"}
                ]}
            ],
            "initiatives": [],
            "backlog": []
        }"#,
    )
    .unwrap();

    agentboard(&dir)
        .arg("board")
        .assert()
        .success()
        .stdout(predicate::str::contains("Queue (1 tasks)"))
        .stdout(predicate::str::contains("[-] implement login"))
        .stdout(predicate::str::contains("[review] old task"));
}

#[test]
fn test_export_writes_backup_file() {
    let dir = temp_dir();
    agentboard(&dir)
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written to"));

    let exports: Vec<_> = std::fs::read_dir(dir.path().join("exports"))
        .unwrap()
        .collect();
    assert_eq!(exports.len(), 1);
}

#[test]
fn test_export_includes_archived_results() {
    let dir = temp_dir();
    let result_dir = dir.path().join("results").join("task-1");
    std::fs::create_dir_all(&result_dir).unwrap();
    std::fs::write(result_dir.join("meta.json"), r#"{"success": true}"#).unwrap();
    std::fs::write(result_dir.join("RESULT.md"), "done").unwrap();

    agentboard(&dir)
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 archived results"));
}

//! On-demand JSON backups: board snapshot plus the per-task result
//! archives and a couple of runtime stats, written under `exports/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use crate::board::store::BoardStore;
use crate::config::Config;

#[derive(Debug)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub tasks: usize,
    pub results: usize,
}

/// Collect the archived results under `results/` as JSON items.
fn collect_results(config: &Config) -> Vec<serde_json::Value> {
    let Ok(entries) = std::fs::read_dir(config.results_dir()) else {
        return vec![];
    };
    let mut results = vec![];
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let task_id = entry.file_name().to_string_lossy().into_owned();
        let meta = std::fs::read_to_string(dir.join("meta.json"))
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .unwrap_or(serde_json::Value::Null);
        let result_md = std::fs::read_to_string(dir.join("RESULT.md")).unwrap_or_default();
        results.push(json!({
            "taskId": task_id,
            "meta": meta,
            "result": result_md,
        }));
    }
    results
}

/// Write `exports/backup-<timestamp>.json` and report what went into it.
pub async fn write_backup(
    config: &Config,
    store: &dyn BoardStore,
    completed: u64,
    active: usize,
) -> Result<ExportSummary> {
    let board = store.get_board().await.context("Board fetch failed")?;
    let tasks = board.columns.iter().map(|c| c.tasks.len()).sum();
    let results = collect_results(config);
    let result_count = results.len();

    let backup = json!({
        "createdAt": chrono::Utc::now().to_rfc3339(),
        "board": board,
        "results": results,
        "stats": {
            "tasks": tasks,
            "completedTasks": completed,
            "activeAgents": active,
        },
    });

    let dir = config.exports_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!(
        "backup-{}.json",
        chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ")
    ));
    std::fs::write(&path, serde_json::to_string_pretty(&backup)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(ExportSummary {
        path,
        tasks,
        results: result_count,
    })
}

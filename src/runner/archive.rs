//! Per-task result archival.
//!
//! After a run, `results/<taskId>/` receives the labeled agent log, the
//! agent's `RESULT.md` (or a synthesized stand-in from the stdout tail),
//! and a `meta.json` with the supervisor outcome. The returned summary is
//! what lands in the task's embedded meta.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use crate::util::{tail_lines, truncate_chars};

use super::supervisor::Outcome;

pub const SUMMARY_MAX_CHARS: usize = 500;
const SYNTH_TAIL_LINES: usize = 20;

#[derive(Debug)]
pub struct ArchivedResult {
    pub result_dir: PathBuf,
    pub summary: String,
}

/// Archive one run. `workdir` is the agent's workspace, checked for a
/// self-written `RESULT.md`.
pub fn archive_result(
    results_root: &Path,
    task_id: &str,
    agent_id: &str,
    workdir: &Path,
    outcome: &Outcome,
) -> Result<ArchivedResult> {
    let result_dir = results_root.join(task_id);
    std::fs::create_dir_all(&result_dir)
        .with_context(|| format!("Failed to create {}", result_dir.display()))?;

    let log = format!(
        "=== STDOUT ===\n{}\n\n=== STDERR ===\n{}\n",
        outcome.stdout, outcome.stderr
    );
    std::fs::write(result_dir.join("agent.log"), log).context("Failed to write agent.log")?;

    let result_md_src = workdir.join("RESULT.md");
    let result_md = if result_md_src.is_file() {
        std::fs::copy(&result_md_src, result_dir.join("RESULT.md"))
            .context("Failed to copy RESULT.md")?;
        std::fs::read_to_string(&result_md_src).unwrap_or_default()
    } else {
        let synthesized = synthesize_result_md(outcome);
        std::fs::write(result_dir.join("RESULT.md"), &synthesized)
            .context("Failed to write synthesized RESULT.md")?;
        synthesized
    };

    let meta = json!({
        "taskId": task_id,
        "agent": agent_id,
        "success": outcome.success,
        "exitCode": outcome.exit_code,
        "durationMs": outcome.duration_ms,
        "timedOut": outcome.timed_out,
        "completedAt": chrono::Utc::now().to_rfc3339(),
    });
    std::fs::write(
        result_dir.join("meta.json"),
        serde_json::to_string_pretty(&meta)?,
    )
    .context("Failed to write meta.json")?;

    Ok(ArchivedResult {
        result_dir,
        summary: truncate_chars(result_md.trim(), SUMMARY_MAX_CHARS),
    })
}

/// No `RESULT.md` from the agent: fall back to the stdout tail.
fn synthesize_result_md(outcome: &Outcome) -> String {
    let tail = truncate_chars(
        tail_lines(outcome.stdout.trim(), SYNTH_TAIL_LINES).trim(),
        SUMMARY_MAX_CHARS,
    );
    if tail.is_empty() {
        "# Ergebnis\n\nKeine Ausgabe vom Agenten.".to_string()
    } else {
        format!("# Ergebnis\n\n{}", tail)
    }
}

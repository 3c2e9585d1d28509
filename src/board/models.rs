//! Board document model: columns, tasks, backlog projects, agent metadata.
//!
//! Field names on the wire are camelCase to match the board CRUD; Rust code
//! uses snake_case throughout.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The full board document. `initiatives` are opaque to the orchestrator
/// and round-trip untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Board {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub initiatives: Vec<serde_json::Value>,
    #[serde(default)]
    pub backlog: Vec<BacklogProject>,
}

impl Board {
    /// Case-insensitive column lookup by title.
    pub fn column_by_title(&self, title: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.title.eq_ignore_ascii_case(title))
    }

    pub fn column_by_id(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Find a task anywhere on the board, with its column id.
    pub fn find_task(&self, task_id: &str) -> Option<(&Column, &Task)> {
        self.columns.iter().find_map(|c| {
            c.tasks
                .iter()
                .find(|t| t.id == task_id)
                .map(|t| (c, t))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: i64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_at: Option<String>,
}

/// Payload for task creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub column_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: i64,
}

/// Partial task update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<i64>,
}

impl TaskPatch {
    pub fn description(description: String) -> Self {
        Self {
            description: Some(description),
            ..Self::default()
        }
    }
}

// ── Agent metadata carried inside task descriptions ───────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaStatus {
    #[default]
    Queued,
    Running,
    Review,
    Failed,
}

impl MetaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Review => "review",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for MetaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "review" => Ok(Self::Review),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid meta status: {}", s)),
        }
    }
}

/// Orchestration state embedded in a task description after the sentinel.
/// The task runner is the sole writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub status: MetaStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}

// ── Backlog ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    #[default]
    None,
    Generating,
    Ready,
    Error,
}

impl SpecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// A generated task suggestion inside a backlog project's spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecTask {
    pub title: String,
    #[serde(default)]
    pub details: String,
}

/// A candidate work item awaiting a generated specification. Owned by the
/// UI except for `spec_status`, `spec`, and `spec_tasks`, which the spec
/// generator writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogProject {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_link: Option<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub spec_status: SpecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default)]
    pub spec_tasks: Vec<SpecTask>,
    pub created_at: String,
}

/// An attached document: inlined content or a URL fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Partial backlog update covering the generator-owned fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_status: Option<SpecStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_tasks: Option<Vec<SpecTask>>,
}

// ── Agent registry entries ────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// One external CLI agent known to the task runner. `args` entries may
/// carry the substitution tokens `{prompt}` and `{timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub cmd: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, rename = "ramMB")]
    pub ram_mb: u64,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ── Id synthesis ──────────────────────────────────────────────────────

/// Numeric id from the wall clock plus a three-digit suffix, unique within
/// a process even when called in the same millisecond.
pub fn synth_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let suffix = COUNTER.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("{}{:03}", chrono::Utc::now().timestamp_millis(), suffix)
}

/// RFC 3339 timestamp of now, the board's timestamp format.
pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

//! The task runner: polls the `Queue` column, routes tasks to agents,
//! supervises their processes, archives results, and drives the task state
//! machine (`queued → running → review | failed`).
//!
//! One coordinator tick at a time makes every decision against a board
//! snapshot; agent execution itself runs in spawned tasks whose state
//! changes flow through the shared [`RunnerState`]. Admission (concurrency
//! cap, RAM floors) turns a tick into a no-op without advancing anything.

pub mod archive;
pub mod registry;
pub mod router;
pub mod supervisor;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::board::bootstrap::{ensure_workflow_columns, resolve_workflow_columns};
use crate::board::meta;
use crate::board::models::{AgentDef, AgentMeta, Board, MetaStatus, Task, TaskPatch, now_ts};
use crate::board::store::BoardStore;
use crate::board::WorkflowColumns;
use crate::config::Config;
use crate::sys;
use crate::util::truncate_chars;

use registry::RegistryHandle;

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const MAX_ATTEMPTS: u32 = 3;
const STDERR_SNIPPET_MAX: usize = 200;
const RELATED_TASKS_MAX: usize = 5;

/// One running agent, visible to the status surface.
pub struct ActiveAgent {
    pub agent: String,
    pub pid: Option<u32>,
    pub started: Instant,
}

/// State shared between the runner coordinator and the control server.
pub struct RunnerState {
    pub active: Mutex<HashMap<String, ActiveAgent>>,
    pub completed: AtomicU64,
    pub last_poll_error: Mutex<Option<String>>,
    pub columns: Mutex<Option<WorkflowColumns>>,
    pub started_at: Instant,
}

impl RunnerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn active_len(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn is_tracked(&self, task_id: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains_key(task_id))
            .unwrap_or(false)
    }

    /// Send SIGTERM to every active agent process (graceful shutdown).
    pub fn signal_all_children(&self) {
        #[cfg(unix)]
        if let Ok(active) = self.active.lock() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            for (task_id, entry) in active.iter() {
                if let Some(pid) = entry.pid {
                    eprintln!("[runner] Terminating agent for task {} (pid {})", task_id, pid);
                    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                }
            }
        }
    }
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            completed: AtomicU64::new(0),
            last_poll_error: Mutex::new(None),
            columns: Mutex::new(None),
            started_at: Instant::now(),
        }
    }
}

pub struct TaskRunner {
    store: Arc<dyn BoardStore>,
    registry: Arc<RegistryHandle>,
    config: Arc<Config>,
    state: Arc<RunnerState>,
    mem_probe: fn() -> Option<u64>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn BoardStore>,
        registry: Arc<RegistryHandle>,
        config: Arc<Config>,
        state: Arc<RunnerState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            config,
            state,
            mem_probe: sys::free_memory_mb,
        })
    }

    #[cfg(test)]
    fn with_mem_probe(
        store: Arc<dyn BoardStore>,
        registry: Arc<RegistryHandle>,
        config: Arc<Config>,
        state: Arc<RunnerState>,
        mem_probe: fn() -> Option<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            config,
            state,
            mem_probe,
        })
    }

    /// Run the poll loop forever. Each tick is its own failure domain.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(self: &Arc<Self>) {
        let error = self.tick_inner().await.err().map(|e| format!("{:#}", e));
        if let Some(ref msg) = error {
            eprintln!("[runner] Poll failed: {}", msg);
        }
        if let Ok(mut slot) = self.state.last_poll_error.lock() {
            *slot = error;
        }
    }

    async fn tick_inner(self: &Arc<Self>) -> Result<()> {
        // Admission: concurrency cap, then the global memory floor. A
        // refused tick advances nothing.
        if self.state.active_len() >= self.config.max_concurrent_agents {
            return Ok(());
        }
        let free_mb = (self.mem_probe)();
        if let Some(free) = free_mb
            && free < self.config.min_free_mem_mb
        {
            eprintln!(
                "[runner] Skipping tick: {} MB free is below the {} MB floor",
                free, self.config.min_free_mem_mb
            );
            return Ok(());
        }

        let board = self.store.get_board().await.context("Board fetch failed")?;

        // Titles are authoritative; ids are re-resolved every tick and the
        // bootstrap path recreates whatever is missing.
        let columns = match resolve_workflow_columns(&board) {
            Some(columns) => columns,
            None => ensure_workflow_columns(self.store.as_ref())
                .await
                .context("Workflow column bootstrap failed")?,
        };
        if let Ok(mut cached) = self.state.columns.lock() {
            *cached = Some(columns.clone());
        }

        let Some(queue) = board.column_by_id(&columns.queue) else {
            return Ok(());
        };
        let Some(task) = queue.tasks.iter().find(|t| !self.state.is_tracked(&t.id)) else {
            return Ok(());
        };
        let mut task = task.clone();
        let mut task_meta = meta::parse(&task.description).unwrap_or_default();

        // Stale-state repair: meta says running but no supervisor exists
        // locally. Reset to queued and carry on with this task.
        if task_meta.status == MetaStatus::Running {
            eprintln!(
                "[runner] Task {} claims to be running without a supervisor, resetting to queued",
                task.id
            );
            task_meta.status = MetaStatus::Queued;
            task.description = meta::embed(&task.description, &task_meta);
            if let Err(e) = self
                .store
                .update_task(&task.id, &TaskPatch::description(task.description.clone()))
                .await
            {
                eprintln!("[runner] Stale-state repair write failed: {}", e);
            }
        }

        // Route and apply the per-agent RAM floor. Failing it leaves the
        // task exactly where it is.
        let registry = self.registry.current();
        let agent = router::route(&task, &registry);
        if let Some(free) = free_mb
            && agent.ram_mb > 0
            && free < agent.ram_mb
        {
            eprintln!(
                "[runner] Agent {} needs {} MB but only {} MB free, waiting",
                agent.id, agent.ram_mb, free
            );
            return Ok(());
        }

        let workspace = self.config.workspaces_dir().join(&task.id);
        std::fs::create_dir_all(&workspace)
            .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

        // Commit to the dispatch: bump attempts, mark running, move to WIP.
        task_meta.agent = Some(agent.id.clone());
        task_meta.attempts += 1;
        task_meta.status = MetaStatus::Running;
        task_meta.started_at = Some(now_ts());
        task.description = meta::embed(&task.description, &task_meta);
        self.store
            .update_task(&task.id, &TaskPatch::description(task.description.clone()))
            .await
            .context("Failed to write dispatch meta")?;
        if let Err(e) = self.store.move_task(&task.id, &columns.wip).await {
            eprintln!("[runner] Could not move task {} to Agent WIP: {}", task.id, e);
        }

        let prompt = build_prompt(&task, &board);

        // Reserve the slot before spawning so the cap holds even while the
        // execution task is still starting up.
        if let Ok(mut active) = self.state.active.lock() {
            active.insert(
                task.id.clone(),
                ActiveAgent {
                    agent: agent.id.clone(),
                    pid: None,
                    started: Instant::now(),
                },
            );
        }

        eprintln!(
            "[runner] Dispatching task {} ('{}') to agent {} (attempt {})",
            task.id, task.title, agent.id, task_meta.attempts
        );
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner
                .execute(task, task_meta, agent, columns, workspace, prompt)
                .await;
        });
        Ok(())
    }

    async fn execute(
        self: Arc<Self>,
        task: Task,
        task_meta: AgentMeta,
        agent: Arc<AgentDef>,
        columns: WorkflowColumns,
        workspace: PathBuf,
        prompt: String,
    ) {
        let outcome = match supervisor::start(&agent, &prompt, &workspace) {
            Ok(running) => {
                if let Ok(mut active) = self.state.active.lock()
                    && let Some(entry) = active.get_mut(&task.id)
                {
                    entry.pid = running.pid();
                }
                running.supervise().await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => {
                let archived = archive::archive_result(
                    &self.config.results_dir(),
                    &task.id,
                    &agent.id,
                    &workspace,
                    &outcome,
                );
                let (result_path, summary) = match archived {
                    Ok(archived) => (
                        Some(archived.result_dir.display().to_string()),
                        Some(archived.summary),
                    ),
                    Err(e) => {
                        eprintln!("[runner] Archiving for task {} failed: {:#}", task.id, e);
                        (None, None)
                    }
                };

                if outcome.success {
                    self.finish_success(&task, task_meta, &columns, result_path, summary)
                        .await;
                } else {
                    let error = if outcome.timed_out {
                        "Timeout (10min)".to_string()
                    } else {
                        format!(
                            "Exit {}: {}",
                            outcome.exit_code.unwrap_or(-1),
                            truncate_chars(outcome.stderr.trim(), STDERR_SNIPPET_MAX)
                        )
                    };
                    self.finish_failure(&task, task_meta, &columns, error, summary)
                        .await;
                }
            }
            Err(e) => {
                self.finish_failure(&task, task_meta, &columns, format!("{}", e), None)
                    .await;
            }
        }

        if let Ok(mut active) = self.state.active.lock() {
            active.remove(&task.id);
        }
    }

    async fn finish_success(
        &self,
        task: &Task,
        mut task_meta: AgentMeta,
        columns: &WorkflowColumns,
        result_path: Option<String>,
        summary: Option<String>,
    ) {
        task_meta.status = MetaStatus::Review;
        task_meta.result_path = result_path;
        task_meta.last_error = None;
        task_meta.result_summary = summary;
        self.write_meta(task, &task_meta).await;
        if let Err(e) = self.store.move_task(&task.id, &columns.review).await {
            eprintln!("[runner] Could not move task {} to Review: {}", task.id, e);
        }
        self.state.completed.fetch_add(1, Ordering::Relaxed);
        eprintln!("[runner] Task {} finished, moved to Review", task.id);
    }

    async fn finish_failure(
        &self,
        task: &Task,
        mut task_meta: AgentMeta,
        columns: &WorkflowColumns,
        error: String,
        summary: Option<String>,
    ) {
        task_meta.last_error = Some(error.clone());
        task_meta.result_summary = summary;

        if task_meta.attempts < MAX_ATTEMPTS {
            task_meta.status = MetaStatus::Queued;
            self.write_meta(task, &task_meta).await;
            if let Err(e) = self.store.move_task(&task.id, &columns.queue).await {
                eprintln!("[runner] Could not requeue task {}: {}", task.id, e);
            }
            eprintln!(
                "[runner] Task {} failed ({}), retry {}/{}",
                task.id, error, task_meta.attempts, MAX_ATTEMPTS
            );
        } else {
            task_meta.status = MetaStatus::Failed;
            self.write_meta(task, &task_meta).await;
            if let Err(e) = self.store.move_task(&task.id, &columns.review).await {
                eprintln!("[runner] Could not move failed task {}: {}", task.id, e);
            }
            eprintln!(
                "[runner] Task {} failed permanently after {} attempts: {}",
                task.id, task_meta.attempts, error
            );
        }
    }

    /// Board writes after execution are best-effort: the loop carries on
    /// and the next tick self-heals what it can.
    async fn write_meta(&self, task: &Task, task_meta: &AgentMeta) {
        let description = meta::embed(&task.description, task_meta);
        if let Err(e) = self
            .store
            .update_task(&task.id, &TaskPatch::description(description))
            .await
        {
            eprintln!("[runner] Meta write for task {} failed: {}", task.id, e);
        }
    }
}

const TASK_PROMPT_FOOTER: &str = "## Vorgaben\n\
- Arbeite eigenständig im aktuellen Arbeitsverzeichnis.\n\
- Lege am Ende zwingend eine Datei RESULT.md im Arbeitsverzeichnis an.\n\
- RESULT.md enthält: eine kurze Zusammenfassung, die Liste der geänderten \
oder neu erstellten Dateien, relevante Links sowie gegebenenfalls Fehlerhinweise.";

/// The agent prompt: title, user-visible description, the fixed German
/// constraint block, and up to five siblings sharing the task's non-zero
/// color.
fn build_prompt(task: &Task, board: &Board) -> String {
    let mut prompt = format!(
        "# Aufgabe: {}\n\n{}\n\n{}\n",
        task.title,
        meta::strip(&task.description),
        TASK_PROMPT_FOOTER
    );

    if task.color != 0 {
        let related: Vec<String> = board
            .columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .filter(|t| t.id != task.id && t.color == task.color)
            .take(RELATED_TASKS_MAX)
            .map(|t| format!("- {}: {}", t.title, truncate_chars(&meta::strip(&t.description), 120)))
            .collect();
        if !related.is_empty() {
            prompt.push_str(&format!("\n## Verwandte Aufgaben\n{}\n", related.join("\n")));
        }
    }
    prompt
}

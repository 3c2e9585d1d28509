//! The spec generator: polls the backlog and turns flagged projects into
//! specifications via context enrichment, the LLM fallback chain, and the
//! structured-output extractor.
//!
//! Generation is fire-and-forget: the tick spawns one task per project and
//! never awaits it. An in-flight map keyed by project id deduplicates work;
//! entries older than five minutes are reaped so a wedged generation frees
//! its project for retry. A reaped generation that later completes drops
//! its result instead of writing stale state.

pub mod context;
pub mod extract;
pub mod provider;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};

use crate::board::models::{BacklogPatch, BacklogProject, SpecStatus, SpecTask};
use crate::board::store::BoardStore;

use context::{build_spec_prompt, enrich_project};
use extract::extract_spec_output;
use provider::FallbackChain;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const IN_FLIGHT_TTL: Duration = Duration::from_secs(300);

pub struct SpecGenerator {
    store: Arc<dyn BoardStore>,
    chain: FallbackChain,
    http: reqwest::Client,
    debug_dir: PathBuf,
    in_flight: Mutex<HashMap<String, Instant>>,
}

impl SpecGenerator {
    pub fn new(store: Arc<dyn BoardStore>, chain: FallbackChain, debug_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            store,
            chain,
            http: reqwest::Client::new(),
            debug_dir,
            in_flight: Mutex::new(HashMap::new()),
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
        self.reap_stale();

        let projects = match self.store.list_backlog().await {
            Ok(projects) => projects,
            Err(e) => {
                eprintln!("[specgen] Failed to list backlog: {}", e);
                return;
            }
        };

        for project in projects {
            if project.spec_status != SpecStatus::Generating {
                continue;
            }
            {
                let mut in_flight = match self.in_flight.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                if in_flight.contains_key(&project.id) {
                    continue;
                }
                in_flight.insert(project.id.clone(), Instant::now());
            }
            let generator = Arc::clone(self);
            tokio::spawn(async move {
                generator.generate(project).await;
            });
        }
    }

    fn reap_stale(&self) {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return;
        };
        let before = in_flight.len();
        in_flight.retain(|_, started| started.elapsed() < IN_FLIGHT_TTL);
        let reaped = before - in_flight.len();
        if reaped > 0 {
            eprintln!(
                "[specgen] Reaped {} stale generation(s); projects are free to retry",
                reaped
            );
        }
    }

    async fn generate(self: Arc<Self>, project: BacklogProject) {
        let project_id = project.id.clone();
        let patch = match self.generate_inner(&project).await {
            Ok((spec, tasks, provider)) => {
                eprintln!(
                    "[specgen] Generated spec for '{}' via {} ({} tasks)",
                    project.title,
                    provider,
                    tasks.len()
                );
                BacklogPatch {
                    spec_status: Some(SpecStatus::Ready),
                    spec: Some(spec),
                    spec_tasks: Some(tasks),
                }
            }
            Err(e) => {
                eprintln!("[specgen] Generation failed for '{}': {:#}", project.title, e);
                BacklogPatch {
                    spec_status: Some(SpecStatus::Error),
                    spec: Some(format!("Fehler bei der Spezifikationserstellung: {:#}", e)),
                    spec_tasks: None,
                }
            }
        };

        // A reaped entry means another generation may already be running
        // for this project; our result is stale and must not be written.
        let still_tracked = self
            .in_flight
            .lock()
            .map(|mut in_flight| in_flight.remove(&project_id).is_some())
            .unwrap_or(false);
        if !still_tracked {
            eprintln!("[specgen] Dropping stale result for project {}", project_id);
            return;
        }

        if let Err(e) = self.store.update_backlog(&project_id, &patch).await {
            eprintln!("[specgen] Failed to write result for {}: {}", project_id, e);
        }
    }

    async fn generate_inner(
        &self,
        project: &BacklogProject,
    ) -> Result<(String, Vec<SpecTask>, String)> {
        let enrichment = enrich_project(&self.http, project).await;
        let prompt = build_spec_prompt(project, &enrichment);
        let completion = self
            .chain
            .generate(&prompt)
            .await
            .context("LLM chain failed")?;

        match extract_spec_output(&completion.text) {
            Ok(extracted) => Ok((extracted.spec, extracted.tasks, completion.provider)),
            Err(e) => {
                self.dump_debug(&project.id, &completion.text);
                Err(e).context("Model output was not extractable")
            }
        }
    }

    /// Persist unparseable model output for offline diagnosis.
    fn dump_debug(&self, project_id: &str, raw: &str) {
        let file = self.debug_dir.join(format!(
            "extract-{}-{}.txt",
            project_id,
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        ));
        if std::fs::create_dir_all(&self.debug_dir).is_err() {
            return;
        }
        match std::fs::write(&file, raw) {
            Ok(()) => eprintln!("[specgen] Raw model output saved to {}", file.display()),
            Err(e) => eprintln!("[specgen] Could not save debug output: {}", e),
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

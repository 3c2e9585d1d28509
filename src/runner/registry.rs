//! The hot-reloadable agent registry.
//!
//! `agents.json` is loaded at startup and re-read on SIGHUP. Each snapshot
//! is immutable behind an `Arc`; a reload swaps the pointer atomically, so
//! agents already dispatched keep running under the definition they were
//! dispatched with. A failed reload keeps the previous snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result, bail};

use crate::board::models::AgentDef;

/// The hard-coded last-resort agent id.
pub const FALLBACK_AGENT_ID: &str = "claude";

/// One immutable registry snapshot.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Arc<AgentDef>>,
}

impl AgentRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let defs: Vec<AgentDef> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::from_defs(defs)
    }

    pub fn from_defs(defs: Vec<AgentDef>) -> Result<Self> {
        for (i, def) in defs.iter().enumerate() {
            if def.id.trim().is_empty() {
                bail!("Agent entry {} has an empty id", i);
            }
            if def.cmd.trim().is_empty() {
                bail!("Agent '{}' has an empty cmd", def.id);
            }
            if def.args.is_empty() {
                bail!("Agent '{}' has no args template", def.id);
            }
        }
        Ok(Self {
            agents: defs.into_iter().map(Arc::new).collect(),
        })
    }

    /// The built-in single-agent registry used when no `agents.json`
    /// exists.
    pub fn builtin() -> Self {
        Self {
            agents: vec![Arc::new(builtin_fallback_agent())],
        }
    }

    pub fn all(&self) -> &[Arc<AgentDef>] {
        &self.agents
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<AgentDef>> {
        self.agents.iter().filter(|a| a.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AgentDef>> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// The definition behind [`FALLBACK_AGENT_ID`].
pub fn builtin_fallback_agent() -> AgentDef {
    AgentDef {
        id: FALLBACK_AGENT_ID.to_string(),
        name: "Claude Code".to_string(),
        cmd: "claude".to_string(),
        args: vec![
            "--print".to_string(),
            "--dangerously-skip-permissions".to_string(),
            "-p".to_string(),
            "{prompt}".to_string(),
        ],
        keywords: vec![],
        ram_mb: 450,
        default: true,
        enabled: true,
        note: None,
    }
}

/// Shared handle holding the current snapshot.
pub struct RegistryHandle {
    path: PathBuf,
    current: RwLock<Arc<AgentRegistry>>,
}

impl RegistryHandle {
    /// Load from `path`, falling back to the built-in registry when the
    /// file does not exist.
    pub fn open(path: PathBuf) -> Arc<Self> {
        let registry = if path.exists() {
            match AgentRegistry::load(&path) {
                Ok(registry) => {
                    eprintln!(
                        "[registry] Loaded {} agent(s) from {}",
                        registry.len(),
                        path.display()
                    );
                    registry
                }
                Err(e) => {
                    eprintln!(
                        "[registry] Could not load {} ({:#}), using built-in registry",
                        path.display(),
                        e
                    );
                    AgentRegistry::builtin()
                }
            }
        } else {
            eprintln!(
                "[registry] No registry at {}, using built-in '{}' agent",
                path.display(),
                FALLBACK_AGENT_ID
            );
            AgentRegistry::builtin()
        };
        Arc::new(Self {
            path,
            current: RwLock::new(Arc::new(registry)),
        })
    }

    pub fn current(&self) -> Arc<AgentRegistry> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Re-read the registry file. On any failure the previous snapshot
    /// stays active.
    pub fn reload(&self) {
        match AgentRegistry::load(&self.path) {
            Ok(registry) => {
                eprintln!(
                    "[registry] Reloaded {} agent(s) from {}",
                    registry.len(),
                    self.path.display()
                );
                if let Ok(mut guard) = self.current.write() {
                    *guard = Arc::new(registry);
                }
            }
            Err(e) => {
                eprintln!(
                    "[registry] Reload failed ({:#}), keeping previous registry",
                    e
                );
            }
        }
    }
}

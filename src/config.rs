//! Runtime configuration, read from environment variables.
//!
//! All variables are optional; the defaults give a self-contained local
//! deployment (file-backed board, no LLM chain, one concurrent agent).
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `BOARD_API_URL` | Remote board CRUD base URL; absent → local file store |
//! | `BOARD_API_TOKEN` | Bearer token for the board CRUD |
//! | `PRIMARY_LLM_KEY` / `PRIMARY_LLM_URL` / `PRIMARY_LLM_MODEL` | Primary chat provider |
//! | `FALLBACK_LLM_KEY` / `FALLBACK_LLM_URL` / `FALLBACK_LLM_MODEL` | Fallback chat provider |
//! | `MAX_CONCURRENT_AGENTS` | Concurrency cap for the task runner (default 1) |
//! | `MIN_FREE_MEM_MB` | Global RAM admission floor in MB (default 400) |
//! | `AGENTS_FILE` | Agent registry path (default `agents.json`) |
//! | `DATA_DIR` | Root for workspaces/, results/, exports/ (default `.`) |
//! | `CONTROL_PORT` | Local control server port (default 8900) |

use std::path::PathBuf;

/// One chat-completion endpoint (OpenAI-compatible).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub board_url: Option<String>,
    pub board_token: Option<String>,
    pub primary: Option<ProviderConfig>,
    pub fallback: Option<ProviderConfig>,
    pub max_concurrent_agents: usize,
    pub min_free_mem_mb: u64,
    pub agents_file: PathBuf,
    pub data_dir: PathBuf,
    pub control_port: u16,
}

const DEFAULT_PRIMARY_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_PRIMARY_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_FALLBACK_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_FALLBACK_MODEL: &str = "deepseek/deepseek-chat";

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup, so tests never have to
    /// mutate the process environment.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let provider = |key: &str, url: &str, model: &str, def_url: &str, def_model: &str| {
            var(key).map(|api_key| ProviderConfig {
                base_url: var(url).unwrap_or_else(|| def_url.to_string()),
                model: var(model).unwrap_or_else(|| def_model.to_string()),
                api_key,
            })
        };

        Self {
            board_url: var("BOARD_API_URL").filter(|s| !s.is_empty()),
            board_token: var("BOARD_API_TOKEN").filter(|s| !s.is_empty()),
            primary: provider(
                "PRIMARY_LLM_KEY",
                "PRIMARY_LLM_URL",
                "PRIMARY_LLM_MODEL",
                DEFAULT_PRIMARY_URL,
                DEFAULT_PRIMARY_MODEL,
            ),
            fallback: provider(
                "FALLBACK_LLM_KEY",
                "FALLBACK_LLM_URL",
                "FALLBACK_LLM_MODEL",
                DEFAULT_FALLBACK_URL,
                DEFAULT_FALLBACK_MODEL,
            ),
            max_concurrent_agents: var("MAX_CONCURRENT_AGENTS")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(1),
            min_free_mem_mb: var("MIN_FREE_MEM_MB")
                .and_then(|v| v.parse().ok())
                .unwrap_or(400),
            agents_file: var("AGENTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("agents.json")),
            data_dir: var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            control_port: var("CONTROL_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8900),
        }
    }

    pub fn board_file(&self) -> PathBuf {
        self.data_dir.join("board.json")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.data_dir.join("debug")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let cfg = config_with(&[]);
        assert!(cfg.board_url.is_none());
        assert!(cfg.primary.is_none());
        assert!(cfg.fallback.is_none());
        assert_eq!(cfg.max_concurrent_agents, 1);
        assert_eq!(cfg.min_free_mem_mb, 400);
        assert_eq!(cfg.control_port, 8900);
        assert_eq!(cfg.agents_file, PathBuf::from("agents.json"));
    }

    #[test]
    fn primary_enabled_by_key_alone() {
        let cfg = config_with(&[("PRIMARY_LLM_KEY", "sk-test")]);
        let primary = cfg.primary.expect("primary should be configured");
        assert_eq!(primary.api_key, "sk-test");
        assert_eq!(primary.base_url, DEFAULT_PRIMARY_URL);
        assert_eq!(primary.model, DEFAULT_PRIMARY_MODEL);
    }

    #[test]
    fn explicit_urls_override_defaults() {
        let cfg = config_with(&[
            ("FALLBACK_LLM_KEY", "k"),
            ("FALLBACK_LLM_URL", "https://example.test/v1"),
            ("FALLBACK_LLM_MODEL", "tiny"),
        ]);
        let fallback = cfg.fallback.unwrap();
        assert_eq!(fallback.base_url, "https://example.test/v1");
        assert_eq!(fallback.model, "tiny");
    }

    #[test]
    fn zero_concurrency_falls_back_to_one() {
        let cfg = config_with(&[("MAX_CONCURRENT_AGENTS", "0")]);
        assert_eq!(cfg.max_concurrent_agents, 1);
    }

    #[test]
    fn data_dir_drives_layout() {
        let cfg = config_with(&[("DATA_DIR", "/var/lib/agentboard")]);
        assert_eq!(cfg.board_file(), PathBuf::from("/var/lib/agentboard/board.json"));
        assert_eq!(cfg.results_dir(), PathBuf::from("/var/lib/agentboard/results"));
    }
}

//! Typed error hierarchy for the agentboard orchestrator.
//!
//! Four top-level enums cover the failure domains the two loops care about:
//! - `StoreError` — board store access (HTTP, file, in-memory)
//! - `ProviderError` — LLM provider calls, with rate limits distinguished
//! - `ExtractError` — structured-output recovery from model text
//! - `SupervisorError` — agent child-process lifecycle

use thiserror::Error;

/// Errors from the board store, regardless of backing implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Board store returned HTTP {status}")]
    Http { status: u16 },

    #[error("Board store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Board store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Board document is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Task {id} not found")]
    TaskNotFound { id: String },

    #[error("Column {id} not found")]
    ColumnNotFound { id: String },

    #[error("Backlog project {id} not found")]
    ProjectNotFound { id: String },

    #[error("Board store lock poisoned")]
    LockPoisoned,
}

/// Errors from a chat-completion provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider {provider} rate limited (HTTP 429)")]
    RateLimited { provider: String },

    #[error("Provider {provider} returned HTTP {status}")]
    Http { provider: String, status: u16 },

    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Provider {provider} returned no completion choices")]
    EmptyResponse { provider: String },

    #[error("No LLM provider is configured")]
    NotConfigured,
}

/// The four-layer extractor failed on every layer.
#[derive(Debug, Error)]
#[error("Could not extract a spec object from model output ({len} chars)")]
pub struct ExtractError {
    pub len: usize,
}

/// Errors from spawning and supervising an agent process.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn agent command '{cmd}': {source}")]
    SpawnFailed {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for agent process: {0}")]
    WaitFailed(#[source] std::io::Error),
}

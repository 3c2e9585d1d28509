//! Chat-completion providers and the primary→fallback chain.
//!
//! Both providers speak the OpenAI-compatible chat completions dialect,
//! differing only in endpoint, model, credentials, and deadline. Rate
//! limiting on the primary is surfaced as its own variant so the chain can
//! fail over immediately instead of backing off.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, ProviderConfig};
use crate::errors::ProviderError;

pub const PRIMARY_TIMEOUT: Duration = Duration::from_secs(120);
pub const FALLBACK_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_OUTPUT_TOKENS: u32 = 8_192;
const TEMPERATURE: f64 = 0.7;

/// One successful model response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub provider: String,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn id(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<Completion, ProviderError>;
}

// ── OpenAI-compatible HTTP provider ───────────────────────────────────

pub struct OpenAiCompatProvider {
    id: String,
    client: reqwest::Client,
    config: ProviderConfig,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(id: &str, config: ProviderConfig, timeout: Duration) -> Self {
        Self {
            id: id.to_string(),
            client: reqwest::Client::new(),
            config,
            timeout,
        }
    }

    pub fn primary(config: ProviderConfig) -> Self {
        Self::new("primary", config, PRIMARY_TIMEOUT)
    }

    pub fn fallback(config: ProviderConfig) -> Self {
        Self::new("fallback", config, FALLBACK_TIMEOUT)
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS,
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let resp = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeout)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: self.id.clone(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: self.id.clone(),
                status: status.as_u16(),
            });
        }

        let parsed: ChatCompletionResponse = resp.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.id.clone(),
            })?;

        let (prompt_tokens, completion_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(Completion {
            text,
            prompt_tokens,
            completion_tokens,
            provider: self.id.clone(),
        })
    }
}

// ── Fallback chain ────────────────────────────────────────────────────

/// Primary-then-fallback selection. Any primary failure — rate limit,
/// network, non-2xx — falls through to the fallback when one exists.
pub struct FallbackChain {
    primary: Option<Box<dyn ChatProvider>>,
    fallback: Option<Box<dyn ChatProvider>>,
}

impl FallbackChain {
    pub fn new(
        primary: Option<Box<dyn ChatProvider>>,
        fallback: Option<Box<dyn ChatProvider>>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .primary
                .clone()
                .map(|c| Box::new(OpenAiCompatProvider::primary(c)) as Box<dyn ChatProvider>),
            config
                .fallback
                .clone()
                .map(|c| Box::new(OpenAiCompatProvider::fallback(c)) as Box<dyn ChatProvider>),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    pub async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let primary_err = match &self.primary {
            Some(provider) => match provider.complete(prompt).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    match &e {
                        ProviderError::RateLimited { .. } => {
                            eprintln!("[specgen] Primary provider rate limited, trying fallback")
                        }
                        other => eprintln!(
                            "[specgen] Primary provider failed ({}), trying fallback",
                            other
                        ),
                    }
                    Some(e)
                }
            },
            None => None,
        };

        match &self.fallback {
            Some(provider) => provider.complete(prompt).await,
            None => Err(primary_err.unwrap_or(ProviderError::NotConfigured)),
        }
    }
}

//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Tuning for the chat assistant core.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Sampling temperature fixed at session creation.
    pub temperature: f32,
    /// Sampling breadth (top-k) fixed at session creation.
    pub top_k: u32,
    /// Input usage ratio above which a warning is logged.
    pub capacity_warn_ratio: f64,
    /// Input usage ratio above which the session is rebuilt before the next request.
    pub capacity_rebuild_ratio: f64,
    /// Longest input echoed verbatim by the offline fallback.
    pub fallback_max_chars: usize,
    /// Longest card body produced by the offline summary fallback.
    pub summary_max_chars: usize,
    /// Upper bound on a semantic search request.
    pub search_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 3,
            capacity_warn_ratio: 0.80,
            capacity_rebuild_ratio: 0.95,
            fallback_max_chars: 100,
            summary_max_chars: 300,
            search_timeout: Duration::from_secs(8),
        }
    }
}

/// Connection settings for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Context window requested per session; also reported as the input quota.
    pub num_ctx: u32,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            num_ctx: 4096,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OllamaConfig {
    /// Load from `CARDMIND_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_url = lookup("CARDMIND_OLLAMA_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let model = lookup("CARDMIND_MODEL").unwrap_or(defaults.model);

        let num_ctx = match lookup("CARDMIND_NUM_CTX") {
            Some(raw) => parse_number("CARDMIND_NUM_CTX", &raw)?,
            None => defaults.num_ctx,
        };
        let request_timeout = match lookup("CARDMIND_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("CARDMIND_REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        if num_ctx == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CARDMIND_NUM_CTX".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            base_url,
            model,
            num_ctx,
            request_timeout,
        })
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

//! Error types for cardmind.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a language-model host or one of its sessions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },

    #[error("Session has been destroyed")]
    SessionDestroyed,

    #[error("No active session")]
    NoSession,

    #[error("Request aborted")]
    Aborted,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a failed streaming exchange.
///
/// `Aborted` is an expected, user-driven interruption and should not be shown
/// as an error. `Failed` carries the underlying cause for the caller to report.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Exchange aborted")]
    Aborted,

    #[error("Exchange failed: {0}")]
    Failed(LlmError),
}

impl ExchangeError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<LlmError> for ExchangeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Aborted => Self::Aborted,
            other => Self::Failed(other),
        }
    }
}

/// Result type alias for cardmind.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_abort_converts_to_exchange_abort() {
        let err: ExchangeError = LlmError::Aborted.into();
        assert!(err.is_aborted());
    }

    #[test]
    fn other_llm_errors_are_failures() {
        let err: ExchangeError = LlmError::SessionDestroyed.into();
        assert!(!err.is_aborted());
        assert!(matches!(err, ExchangeError::Failed(LlmError::SessionDestroyed)));
    }
}

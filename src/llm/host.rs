//! Host capability abstraction: the language model the assistant talks to.
//!
//! A `LanguageModelHost` answers "can I use a model here?" and builds
//! sessions. A `ModelSession` is a configured, stateful conversation handle.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Readiness of the host model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No usable model.
    Unavailable,
    /// Usable once a one-time model download completes.
    AfterDownload,
    /// Usable right away.
    Available,
}

impl Availability {
    /// Collapse to the boolean the rest of the system gates on.
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::AfterDownload => write!(f, "after_download"),
            Self::Available => write!(f, "available"),
        }
    }
}

/// Receives model download progress as a fraction in `[0, 1]`.
#[derive(Clone)]
pub struct DownloadMonitor(Arc<dyn Fn(f64) + Send + Sync>);

impl DownloadMonitor {
    pub fn new(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Report progress, clamped into `[0, 1]`. NaN is ignored.
    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        (self.0)(fraction.clamp(0.0, 1.0));
    }
}

impl std::fmt::Debug for DownloadMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DownloadMonitor")
    }
}

/// Configuration fixed at session creation.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub temperature: f32,
    pub top_k: u32,
    pub monitor: Option<DownloadMonitor>,
}

impl SessionOptions {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            temperature: 0.7,
            top_k: 3,
            monitor: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_monitor(mut self, monitor: DownloadMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }
}

/// Stream of text fragments from a streaming prompt.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A live conversation with the host model.
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Send a message and receive the reply as a stream of fragments.
    async fn prompt_streaming(
        &self,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError>;

    /// Whether `prompt_streaming` yields the whole reply so far on every
    /// item instead of only the newly generated text.
    fn streams_snapshots(&self) -> bool {
        false
    }

    /// Send a message and wait for the whole reply.
    async fn prompt(&self, input: &str, cancel: CancellationToken) -> Result<String, LlmError>;

    /// Release the session's resources. Safe to call more than once.
    async fn destroy(&self);

    /// Input tokens consumed so far, if the host reports it.
    fn input_usage(&self) -> Option<u64> {
        None
    }

    /// Maximum input tokens for this session, if the host reports it.
    fn input_quota(&self) -> Option<u64> {
        None
    }
}

/// The host environment's language model capability.
#[async_trait]
pub trait LanguageModelHost: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Report whether a model can be used.
    async fn availability(&self) -> Result<Availability, LlmError>;

    /// Build a new session. May wait on a model download.
    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, LlmError>;
}

/// A host with no model capability at all.
#[derive(Debug, Default)]
pub struct UnsupportedHost;

#[async_trait]
impl LanguageModelHost for UnsupportedHost {
    fn name(&self) -> &str {
        "unsupported"
    }

    async fn availability(&self) -> Result<Availability, LlmError> {
        Ok(Availability::Unavailable)
    }

    async fn create_session(
        &self,
        _options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, LlmError> {
        Err(LlmError::ModelNotAvailable {
            provider: self.name().to_string(),
            model: "none".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn usable_states() {
        assert!(!Availability::Unavailable.is_usable());
        assert!(Availability::AfterDownload.is_usable());
        assert!(Availability::Available.is_usable());
    }

    #[test]
    fn monitor_clamps_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let monitor = DownloadMonitor::new(move |p| sink.lock().unwrap().push(p));

        monitor.report(-0.5);
        monitor.report(0.25);
        monitor.report(1.7);
        monitor.report(f64::NAN);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 0.25, 1.0]);
    }

    #[tokio::test]
    async fn unsupported_host_never_creates() {
        let host = UnsupportedHost;
        assert_eq!(host.availability().await.unwrap(), Availability::Unavailable);
        assert!(host.create_session(SessionOptions::new("x")).await.is_err());
    }
}

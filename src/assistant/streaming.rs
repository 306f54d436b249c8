//! Streaming coordinator: runs one exchange against the live session.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AssistantConfig;
use crate::error::{ExchangeError, LlmError};
use crate::llm::ModelSession;

use super::fallback::truncate_with_ellipsis;
use super::probe::AvailabilityProbe;
use super::session::SessionManager;

/// Running text of a streamed reply.
///
/// A session declares up front whether it streams deltas or cumulative
/// snapshots; deltas are appended, snapshots replace the text.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    snapshots: bool,
}

impl Accumulator {
    /// Accumulator for a host that sends the whole reply so far each time.
    pub fn snapshots() -> Self {
        Self {
            text: String::new(),
            snapshots: true,
        }
    }

    pub fn for_session(session: &dyn ModelSession) -> Self {
        if session.streams_snapshots() {
            Self::snapshots()
        } else {
            Self::default()
        }
    }

    /// Apply a fragment. Returns whether the text changed.
    pub fn push(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        if self.snapshots {
            if fragment == self.text {
                return false;
            }
            self.text.clear();
        }
        self.text.push_str(fragment);
        true
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Drives request/response exchanges, with offline fallback and cancellation.
pub struct StreamingCoordinator {
    sessions: Arc<SessionManager>,
    probe: Arc<AvailabilityProbe>,
    config: AssistantConfig,
}

impl StreamingCoordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        probe: Arc<AvailabilityProbe>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            sessions,
            probe,
            config,
        }
    }

    /// Deterministic reply used when no model is available.
    pub fn fallback_reply(&self, text: &str) -> String {
        truncate_with_ellipsis(text, self.config.fallback_max_chars)
    }

    /// Send `text` and stream the reply. `on_fragment` receives the whole
    /// reply so far after every fragment. Returns the final text.
    pub async fn send<F>(
        &self,
        text: &str,
        mut on_fragment: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ExchangeError>
    where
        F: FnMut(&str),
    {
        if !self.probe.check().await.is_usable() {
            let reply = self.fallback_reply(text);
            on_fragment(&reply);
            return Ok(reply);
        }

        let cancel = cancel.cloned().unwrap_or_default();
        let session = self.prepare_session().await?;
        if cancel.is_cancelled() {
            return Err(ExchangeError::Aborted);
        }

        let mut stream = session.prompt_streaming(text, cancel.clone()).await?;
        let mut reply = Accumulator::for_session(session.as_ref());
        let mut fragments = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            };

            let item = match next {
                None => {
                    debug!(fragments, "Exchange cancelled");
                    return Err(ExchangeError::Aborted);
                }
                Some(None) => break,
                Some(Some(item)) => item,
            };

            let fragment = item?;
            if cancel.is_cancelled() {
                debug!(fragments, "Exchange cancelled");
                return Err(ExchangeError::Aborted);
            }

            fragments += 1;
            if reply.push(&fragment) {
                on_fragment(reply.as_str());
            }
        }

        debug!(fragments, chars = reply.as_str().len(), "Exchange complete");
        Ok(reply.into_string())
    }

    /// Send `text` and wait for the complete reply.
    pub async fn send_once(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ExchangeError> {
        if !self.probe.check().await.is_usable() {
            return Ok(self.fallback_reply(text));
        }

        let cancel = cancel.cloned().unwrap_or_default();
        let session = self.prepare_session().await?;
        if cancel.is_cancelled() {
            return Err(ExchangeError::Aborted);
        }

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExchangeError::Aborted),
            reply = session.prompt(text, cancel.clone()) => reply?,
        };
        Ok(reply)
    }

    /// Get the live session, rebuilding it first if its input is nearly full.
    async fn prepare_session(&self) -> Result<Arc<dyn ModelSession>, ExchangeError> {
        let session = self
            .sessions
            .ensure_session()
            .await
            .ok_or(ExchangeError::Failed(LlmError::NoSession))?;

        if let (Some(used), Some(quota)) = (session.input_usage(), session.input_quota())
            && quota > 0
        {
            let ratio = used as f64 / quota as f64;
            if ratio > self.config.capacity_warn_ratio {
                warn!(used, quota, ratio, "Session input usage is high");
            }
            if ratio > self.config.capacity_rebuild_ratio {
                if !self.sessions.rebuild().await {
                    return Err(ExchangeError::Failed(LlmError::NoSession));
                }
                return self
                    .sessions
                    .current()
                    .await
                    .ok_or(ExchangeError::Failed(LlmError::NoSession));
            }
        }

        Ok(session)
    }
}

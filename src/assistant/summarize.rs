//! Page summarization for new cards.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AssistantConfig;
use crate::error::LlmError;
use crate::llm::{LanguageModelHost, SessionOptions};

use super::fallback::truncate_with_ellipsis;
use super::probe::AvailabilityProbe;
use super::prompts;

/// Turns extracted page text into a card body.
///
/// Each summary runs in its own short-lived session, separate from the chat
/// session. Without a model, or when the model fails, the page text is
/// truncated instead so card capture keeps working.
pub struct PageSummarizer {
    host: Arc<dyn LanguageModelHost>,
    probe: Arc<AvailabilityProbe>,
    config: AssistantConfig,
}

impl PageSummarizer {
    pub fn new(
        host: Arc<dyn LanguageModelHost>,
        probe: Arc<AvailabilityProbe>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            host,
            probe,
            config,
        }
    }

    pub async fn summarize(&self, title: &str, text: &str) -> String {
        let fallback = || truncate_with_ellipsis(text.trim(), self.config.summary_max_chars);

        if text.trim().is_empty() {
            return String::new();
        }
        if !self.probe.check().await.is_usable() {
            return fallback();
        }

        match self.summarize_with_model(title, text).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => {
                debug!(title, "Model returned an empty summary");
                fallback()
            }
            Err(e) => {
                warn!(title, error = %e, "Summarization failed, truncating page text");
                fallback()
            }
        }
    }

    async fn summarize_with_model(&self, title: &str, text: &str) -> Result<String, LlmError> {
        let options = SessionOptions::new(prompts::summarize_prompt())
            .with_temperature(self.config.temperature)
            .with_top_k(self.config.top_k);
        let session = self.host.create_session(options).await?;

        let result = session
            .prompt(&prompts::summarize_input(title, text), CancellationToken::new())
            .await;
        session.destroy().await;
        result
    }
}

//! Chat assistant core: availability, session lifecycle and streaming.
//!
//! `ChatAssistant` is what a view owns for its lifetime: build it with a
//! host, call `initialize_session` as the mode or selected cards change,
//! `send_message` per user turn, and `destroy` on teardown.

pub mod fallback;
pub mod probe;
pub mod prompts;
pub mod search;
pub mod session;
pub mod streaming;
pub mod summarize;

pub use probe::AvailabilityProbe;
pub use search::CardSearch;
pub use session::{SessionKey, SessionManager};
pub use streaming::{Accumulator, StreamingCoordinator};
pub use summarize::PageSummarizer;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cards::{ChatMode, ContextCard};
use crate::config::AssistantConfig;
use crate::error::ExchangeError;
use crate::llm::{Availability, LanguageModelHost};

/// Facade over the probe, session manager, and streaming coordinator.
pub struct ChatAssistant {
    probe: Arc<AvailabilityProbe>,
    sessions: Arc<SessionManager>,
    streaming: StreamingCoordinator,
    summarizer: PageSummarizer,
    search: CardSearch,
}

impl ChatAssistant {
    pub fn new(host: Arc<dyn LanguageModelHost>, config: AssistantConfig) -> Self {
        let probe = Arc::new(AvailabilityProbe::new(Arc::clone(&host)));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&host),
            Arc::clone(&probe),
            config.clone(),
        ));
        let streaming =
            StreamingCoordinator::new(Arc::clone(&sessions), Arc::clone(&probe), config.clone());
        let summarizer = PageSummarizer::new(Arc::clone(&host), Arc::clone(&probe), config.clone());
        let search = CardSearch::new(host, Arc::clone(&probe), config);

        Self {
            probe,
            sessions,
            streaming,
            summarizer,
            search,
        }
    }

    /// Probe the host (once) and report whether the model is usable.
    pub async fn check_availability(&self) -> bool {
        self.probe.check().await.is_usable()
    }

    /// Cached availability; false until the probe has completed.
    pub fn is_available(&self) -> bool {
        self.probe.is_available()
    }

    pub fn is_checking(&self) -> bool {
        self.probe.is_checking()
    }

    pub fn availability(&self) -> Option<Availability> {
        self.probe.cached()
    }

    /// Ensure a session for (`mode`, `cards`) is current.
    pub async fn initialize_session(&self, mode: ChatMode, cards: &[ContextCard]) -> bool {
        self.sessions.initialize(mode, cards).await
    }

    /// Send a message, streaming the cumulative reply into `on_fragment`.
    pub async fn send_message<F>(
        &self,
        text: &str,
        on_fragment: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ExchangeError>
    where
        F: FnMut(&str),
    {
        self.streaming.send(text, on_fragment, cancel).await
    }

    /// Send a message and wait for the whole reply.
    pub async fn prompt(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<String, ExchangeError> {
        self.streaming.send_once(text, cancel).await
    }

    /// Summarize page text into a card body.
    pub async fn summarize_page(&self, title: &str, text: &str) -> String {
        self.summarizer.summarize(title, text).await
    }

    /// Rank `cards` by relevance to `query`; returns indices into `cards`.
    pub async fn search_cards(&self, query: &str, cards: &[ContextCard]) -> Vec<usize> {
        self.search.rank(query, cards).await
    }

    pub async fn active_key(&self) -> Option<SessionKey> {
        self.sessions.active_key().await
    }

    pub fn download_progress(&self) -> watch::Receiver<Option<f64>> {
        self.sessions.download_progress()
    }

    /// Release the session. The assistant can be initialized again afterwards.
    pub async fn destroy(&self) {
        self.sessions.destroy().await;
    }
}

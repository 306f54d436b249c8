//! Session manager: owns the single live model session.
//!
//! Sessions are keyed by (mode, card set). Asking for the live key is a
//! no-op; asking for any other key destroys the live session and creates a
//! new one. Creation can take a long time (model download), so requests are
//! numbered and only the newest request may install its session: a slow,
//! superseded creation is destroyed when it finally completes. A request for
//! the key a creation is already working on waits for that creation instead
//! of starting another.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cards::{ChatMode, ContextCard};
use crate::config::AssistantConfig;
use crate::llm::{DownloadMonitor, LanguageModelHost, ModelSession, SessionOptions};

use super::probe::AvailabilityProbe;
use super::prompts;

/// Identity of a session configuration. The card list is kept sorted, so two
/// keys built from the same cards in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SessionKey {
    mode: ChatMode,
    cards: Vec<ContextCard>,
}

impl SessionKey {
    pub fn new(mode: ChatMode, cards: &[ContextCard]) -> Self {
        let mut cards = cards.to_vec();
        cards.sort();
        Self { mode, cards }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn cards(&self) -> &[ContextCard] {
        &self.cards
    }
}

/// A requested configuration. The key decides identity; `cards` keeps the
/// caller's order, which is how the system prompt numbers them.
#[derive(Debug, Clone, Default)]
struct SessionRequest {
    key: SessionKey,
    cards: Vec<ContextCard>,
}

impl SessionRequest {
    fn new(mode: ChatMode, cards: &[ContextCard]) -> Self {
        Self {
            key: SessionKey::new(mode, cards),
            cards: cards.to_vec(),
        }
    }
}

struct ActiveSession {
    id: Uuid,
    request: SessionRequest,
    session: Arc<dyn ModelSession>,
    created_at: DateTime<Utc>,
}

impl ActiveSession {
    async fn release(self) {
        self.session.destroy().await;
        info!(
            session_id = %self.id,
            mode = %self.request.key.mode,
            age_secs = (Utc::now() - self.created_at).num_seconds(),
            "Session destroyed"
        );
    }
}

/// A creation in flight. `outcome` becomes `Some(installed)` when it ends.
struct PendingCreation {
    key: SessionKey,
    generation: u64,
    outcome: watch::Receiver<Option<bool>>,
}

impl PendingCreation {
    /// Whether a request for `key` can wait on this creation. A creation
    /// whose task was dropped never reports and cannot be joined.
    fn serves(&self, key: &SessionKey) -> bool {
        self.key == *key && self.outcome.has_changed().is_ok()
    }
}

#[derive(Default)]
struct ManagerState {
    active: Option<ActiveSession>,
    pending: Option<PendingCreation>,
    /// Most recently requested configuration, live or not.
    requested: Option<SessionRequest>,
    /// Bumped on every request that may replace the session.
    generation: u64,
}

impl ManagerState {
    /// Register a new creation for `key`, superseding anything older.
    fn begin(&mut self, key: SessionKey) -> (u64, watch::Sender<Option<bool>>) {
        self.generation += 1;
        let (outcome, rx) = watch::channel(None);
        self.pending = Some(PendingCreation {
            key,
            generation: self.generation,
            outcome: rx,
        });
        (self.generation, outcome)
    }

    fn finish(&mut self, generation: u64) {
        if self.pending.as_ref().is_some_and(|p| p.generation == generation) {
            self.pending = None;
        }
    }
}

enum Plan {
    Join(watch::Receiver<Option<bool>>),
    Create {
        generation: u64,
        outcome: watch::Sender<Option<bool>>,
        previous: Option<ActiveSession>,
    },
}

async fn wait_for_creation(mut outcome: watch::Receiver<Option<bool>>) -> bool {
    match outcome.wait_for(Option::is_some).await {
        Ok(result) => *result == Some(true),
        Err(_) => false,
    }
}

/// Owns at most one live session and replaces it as the key changes.
pub struct SessionManager {
    host: Arc<dyn LanguageModelHost>,
    probe: Arc<AvailabilityProbe>,
    config: AssistantConfig,
    progress: Arc<watch::Sender<Option<f64>>>,
    state: Mutex<ManagerState>,
}

impl SessionManager {
    pub fn new(
        host: Arc<dyn LanguageModelHost>,
        probe: Arc<AvailabilityProbe>,
        config: AssistantConfig,
    ) -> Self {
        let (progress, _rx) = watch::channel(None);
        Self {
            host,
            probe,
            config,
            progress: Arc::new(progress),
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Subscribe to model download progress (`None` until a download reports).
    pub fn download_progress(&self) -> watch::Receiver<Option<f64>> {
        self.progress.subscribe()
    }

    /// Make the session for (`mode`, `cards`) current. Returns `false` if the
    /// model is unavailable, creation failed, or a newer request superseded
    /// this one.
    pub async fn initialize(&self, mode: ChatMode, cards: &[ContextCard]) -> bool {
        self.initialize_request(SessionRequest::new(mode, cards)).await
    }

    async fn initialize_request(&self, request: SessionRequest) -> bool {
        if !self.probe.check().await.is_usable() {
            debug!(mode = %request.key.mode, "Model unavailable, not creating session");
            return false;
        }

        let plan = {
            let mut state = self.state.lock().await;
            state.requested = Some(request.clone());

            if let Some(active) = state.active.as_ref()
                && active.request.key == request.key
            {
                debug!(session_id = %active.id, mode = %request.key.mode, "Reusing session");
                return true;
            }

            let joinable = state
                .pending
                .as_ref()
                .filter(|pending| pending.serves(&request.key))
                .map(|pending| pending.outcome.clone());

            match joinable {
                Some(outcome) => Plan::Join(outcome),
                None => {
                    let (generation, outcome) = state.begin(request.key.clone());
                    Plan::Create {
                        generation,
                        outcome,
                        previous: state.active.take(),
                    }
                }
            }
        };

        match plan {
            Plan::Join(outcome) => {
                debug!(mode = %request.key.mode, "Waiting on session creation in flight");
                wait_for_creation(outcome).await
            }
            Plan::Create {
                generation,
                outcome,
                previous,
            } => {
                if let Some(previous) = previous {
                    previous.release().await;
                }
                self.create(request, generation, outcome).await
            }
        }
    }

    /// Recreate the session for the current key, discarding its history.
    pub async fn rebuild(&self) -> bool {
        let (request, generation, outcome, previous) = {
            let mut state = self.state.lock().await;
            let request = match state.active.as_ref() {
                Some(active) => active.request.clone(),
                None => match state.requested.clone() {
                    Some(request) => request,
                    None => return false,
                },
            };
            let (generation, outcome) = state.begin(request.key.clone());
            (request, generation, outcome, state.active.take())
        };

        if let Some(previous) = previous {
            previous.release().await;
        }

        info!(mode = %request.key.mode, cards = request.cards.len(), "Rebuilding session");
        self.create(request, generation, outcome).await
    }

    async fn create(
        &self,
        request: SessionRequest,
        generation: u64,
        outcome: watch::Sender<Option<bool>>,
    ) -> bool {
        let progress = Arc::clone(&self.progress);
        let monitor = DownloadMonitor::new(move |fraction| {
            progress.send_replace(Some(fraction));
        });

        let options = SessionOptions::new(prompts::system_prompt(request.key.mode, &request.cards))
            .with_temperature(self.config.temperature)
            .with_top_k(self.config.top_k)
            .with_monitor(monitor);

        let session = match self.host.create_session(options).await {
            Ok(session) => session,
            Err(e) => {
                warn!(host = self.host.name(), mode = %request.key.mode, error = %e, "Session creation failed");
                self.state.lock().await.finish(generation);
                outcome.send_replace(Some(false));
                return false;
            }
        };

        let installed = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                Err(session)
            } else {
                state.finish(generation);
                let active = ActiveSession {
                    id: Uuid::new_v4(),
                    request,
                    session,
                    created_at: Utc::now(),
                };
                info!(
                    session_id = %active.id,
                    mode = %active.request.key.mode,
                    cards = active.request.cards.len(),
                    "Session created"
                );
                Ok(state.active.replace(active))
            }
        };

        let result = match installed {
            Ok(displaced) => {
                if let Some(displaced) = displaced {
                    displaced.release().await;
                }
                true
            }
            Err(stale) => {
                debug!(generation, "Discarding session from superseded request");
                stale.destroy().await;
                false
            }
        };
        outcome.send_replace(Some(result));
        result
    }

    /// The live session, if any.
    pub async fn current(&self) -> Option<Arc<dyn ModelSession>> {
        let state = self.state.lock().await;
        state.active.as_ref().map(|a| Arc::clone(&a.session))
    }

    /// Key of the live session, if any.
    pub async fn active_key(&self) -> Option<SessionKey> {
        let state = self.state.lock().await;
        state.active.as_ref().map(|a| a.request.key.clone())
    }

    /// The live session, creating one for the last requested configuration
    /// (or the default general chat with no cards) when none is live. A
    /// creation already in flight for that configuration is waited on.
    pub async fn ensure_session(&self) -> Option<Arc<dyn ModelSession>> {
        if let Some(session) = self.current().await {
            return Some(session);
        }

        let request = self.state.lock().await.requested.clone().unwrap_or_default();
        if self.initialize_request(request).await {
            self.current().await
        } else {
            None
        }
    }

    /// Release the live session and invalidate any creation in flight.
    pub async fn destroy(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.pending = None;
            state.requested = None;
            state.active.take()
        };

        if let Some(previous) = previous {
            previous.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_card_order() {
        let a = ContextCard::new("A", "alpha");
        let b = ContextCard::new("B", "beta");
        assert_eq!(
            SessionKey::new(ChatMode::Compare, &[a.clone(), b.clone()]),
            SessionKey::new(ChatMode::Compare, &[b, a])
        );
    }

    #[test]
    fn key_distinguishes_mode_and_content() {
        let card = ContextCard::new("A", "alpha");
        let key = SessionKey::new(ChatMode::Quiz, &[card.clone()]);
        assert_ne!(key, SessionKey::new(ChatMode::Write, &[card]));
        assert_ne!(key, SessionKey::new(ChatMode::Quiz, &[ContextCard::new("A", "alpha!")]));
        assert_ne!(key, SessionKey::new(ChatMode::Quiz, &[]));
    }

    #[test]
    fn request_keeps_caller_order() {
        let zeta = ContextCard::new("Zeta", "z");
        let alpha = ContextCard::new("Alpha", "a");
        let request = SessionRequest::new(ChatMode::Compare, &[zeta.clone(), alpha.clone()]);
        assert_eq!(request.cards, vec![zeta.clone(), alpha.clone()]);
        assert_eq!(request.key.cards(), &[alpha, zeta]);
    }

    #[test]
    fn joined_creation_reports_its_outcome() {
        let mut state = ManagerState::default();
        let key = SessionKey::new(ChatMode::Quiz, &[]);
        let (generation, outcome) = state.begin(key.clone());

        let pending = state.pending.as_ref().unwrap();
        assert!(pending.serves(&key));
        assert!(!pending.serves(&SessionKey::default()));
        let joined = pending.outcome.clone();

        state.finish(generation);
        assert!(state.pending.is_none());
        outcome.send_replace(Some(true));
        assert_eq!(*joined.borrow(), Some(true));
    }

    #[test]
    fn dropped_creation_cannot_be_joined() {
        let mut state = ManagerState::default();
        let key = SessionKey::new(ChatMode::Write, &[]);
        let (_, outcome) = state.begin(key.clone());
        drop(outcome);
        assert!(!state.pending.as_ref().unwrap().serves(&key));
    }

    #[test]
    fn newer_creation_supersedes_pending() {
        let mut state = ManagerState::default();
        let (first, _a) = state.begin(SessionKey::new(ChatMode::Quiz, &[]));
        let (second, _b) = state.begin(SessionKey::new(ChatMode::Write, &[]));
        assert!(second > first);

        state.finish(first);
        assert_eq!(state.pending.as_ref().map(|p| p.generation), Some(second));
    }

    #[test]
    fn default_key_is_general_without_cards() {
        let key = SessionKey::default();
        assert_eq!(key.mode(), ChatMode::General);
        assert!(key.cards().is_empty());
    }
}

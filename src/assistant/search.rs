//! Semantic card search with a keyword fallback.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cards::ContextCard;
use crate::config::AssistantConfig;
use crate::error::LlmError;
use crate::llm::{LanguageModelHost, SessionOptions};

use super::probe::AvailabilityProbe;
use super::prompts;

static CARD_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static NONE_REPLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bnone\b").unwrap());

/// Ranks cards against a query. Results are indices into the input slice,
/// most relevant first.
pub struct CardSearch {
    host: Arc<dyn LanguageModelHost>,
    probe: Arc<AvailabilityProbe>,
    config: AssistantConfig,
}

impl CardSearch {
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

    pub async fn rank(&self, query: &str, cards: &[ContextCard]) -> Vec<usize> {
        if query.trim().is_empty() {
            return (0..cards.len()).collect();
        }
        if cards.is_empty() {
            return Vec::new();
        }
        if !self.probe.check().await.is_usable() {
            return keyword_rank(query, cards);
        }

        match self.rank_with_model(query, cards).await {
            Ok(Some(ranked)) => ranked,
            Ok(None) => {
                debug!(query, "Unparseable search reply, using keyword ranking");
                keyword_rank(query, cards)
            }
            Err(e) => {
                warn!(query, error = %e, "Semantic search failed, using keyword ranking");
                keyword_rank(query, cards)
            }
        }
    }

    /// Ask a one-off session for a ranking, bounded by the search timeout.
    async fn rank_with_model(
        &self,
        query: &str,
        cards: &[ContextCard],
    ) -> Result<Option<Vec<usize>>, LlmError> {
        let deadline = Instant::now() + self.config.search_timeout;
        let timed_out = || LlmError::RequestFailed {
            provider: self.host.name().to_string(),
            reason: format!("search timed out after {:?}", self.config.search_timeout),
        };

        let options = SessionOptions::new(prompts::search_prompt())
            .with_temperature(0.0)
            .with_top_k(1);
        let session = timeout_at(deadline, self.host.create_session(options))
            .await
            .map_err(|_| timed_out())??;

        let cancel = CancellationToken::new();
        let reply = timeout_at(
            deadline,
            session.prompt(&prompts::search_input(query, cards), cancel.clone()),
        )
        .await;
        cancel.cancel();
        session.destroy().await;

        let reply = reply.map_err(|_| timed_out())??;
        Ok(parse_ranking(&reply, cards.len()))
    }
}

/// Parse 1-based card numbers from a model reply into 0-based indices.
///
/// Out-of-range and repeated numbers are dropped. `None` means the reply
/// had neither numbers nor an explicit NONE.
pub fn parse_ranking(reply: &str, card_count: usize) -> Option<Vec<usize>> {
    let mut seen = HashSet::new();
    let ranked: Vec<usize> = CARD_NUMBER
        .find_iter(reply)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|n| (1..=card_count).contains(n))
        .map(|n| n - 1)
        .filter(|i| seen.insert(*i))
        .collect();

    if ranked.is_empty() && !NONE_REPLY.is_match(reply) && !CARD_NUMBER.is_match(reply) {
        return None;
    }
    Some(ranked)
}

/// Rank by query term hits: a title hit counts twice, a body hit once.
/// Cards without hits are left out; ties keep input order.
pub fn keyword_rank(query: &str, cards: &[ContextCard]) -> Vec<usize> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();

    let mut scored: Vec<(usize, usize)> = cards
        .iter()
        .enumerate()
        .filter_map(|(i, card)| {
            let title = card.title.to_lowercase();
            let content = card.content.to_lowercase();
            let score: usize = terms
                .iter()
                .map(|t| {
                    let mut s = 0;
                    if title.contains(t.as_str()) {
                        s += 2;
                    }
                    if content.contains(t.as_str()) {
                        s += 1;
                    }
                    s
                })
                .sum();
            (score > 0).then_some((i, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

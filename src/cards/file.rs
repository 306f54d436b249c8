//! Loading context cards from a JSON export of the card store.

use std::path::Path;

use tracing::info;

use crate::error::ConfigError;

use super::model::ContextCard;

/// Read a JSON array of `{ "title": ..., "content": ... }` objects.
///
/// Cards with an empty title and empty body are skipped.
pub async fn load_cards(path: &Path) -> Result<Vec<ContextCard>, ConfigError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let cards: Vec<ContextCard> = serde_json::from_str(&raw).map_err(|e| {
        ConfigError::ParseError(format!("{}: {}", path.display(), e))
    })?;

    let cards: Vec<ContextCard> = cards
        .into_iter()
        .filter(|c| !(c.title.trim().is_empty() && c.content.trim().is_empty()))
        .collect();

    info!(path = %path.display(), count = cards.len(), "Loaded context cards");
    Ok(cards)
}

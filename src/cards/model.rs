//! Card data model: context cards and chat modes.

use serde::{Deserialize, Serialize};

/// A knowledge card supplied as background material for a chat session.
///
/// Ordering is by title then content, which is what makes a card set
/// comparable regardless of the order the UI hands it over in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextCard {
    pub title: String,
    pub content: String,
}

impl ContextCard {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Conversation intent; selects the system instruction template.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Free-form chat about the cards.
    #[default]
    #[serde(rename = "chat", alias = "general")]
    General,
    /// Explain the concepts in the cards.
    Understand,
    /// Compare and contrast the cards.
    Compare,
    /// Generate quiz questions from the cards.
    Quiz,
    /// Draft writing that draws on the cards.
    Write,
}

impl ChatMode {
    pub const ALL: [ChatMode; 5] = [
        Self::General,
        Self::Understand,
        Self::Compare,
        Self::Quiz,
        Self::Write,
    ];
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "chat"),
            Self::Understand => write!(f, "understand"),
            Self::Compare => write!(f, "compare"),
            Self::Quiz => write!(f, "quiz"),
            Self::Write => write!(f, "write"),
        }
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "general" => Ok(Self::General),
            "understand" | "explain" => Ok(Self::Understand),
            "compare" => Ok(Self::Compare),
            "quiz" => Ok(Self::Quiz),
            "write" => Ok(Self::Write),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_display() {
        for mode in ChatMode::ALL {
            assert_eq!(mode.to_string().parse::<ChatMode>().unwrap(), mode);
        }
    }

    #[test]
    fn mode_parse_accepts_aliases() {
        assert_eq!("General".parse::<ChatMode>().unwrap(), ChatMode::General);
        assert_eq!("explain".parse::<ChatMode>().unwrap(), ChatMode::Understand);
        assert!("summarize".parse::<ChatMode>().is_err());
    }

    #[test]
    fn default_mode_is_general_chat() {
        assert_eq!(ChatMode::default(), ChatMode::General);
    }

    #[test]
    fn mode_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ChatMode::General).unwrap(), "\"chat\"");
        assert_eq!(serde_json::to_string(&ChatMode::Quiz).unwrap(), "\"quiz\"");
        let mode: ChatMode = serde_json::from_str("\"understand\"").unwrap();
        assert_eq!(mode, ChatMode::Understand);
    }

    #[test]
    fn cards_sort_by_title_then_content() {
        let mut cards = vec![
            ContextCard::new("b", "1"),
            ContextCard::new("a", "2"),
            ContextCard::new("a", "1"),
        ];
        cards.sort();
        assert_eq!(cards[0], ContextCard::new("a", "1"));
        assert_eq!(cards[2], ContextCard::new("b", "1"));
    }
}

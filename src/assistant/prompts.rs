//! System instructions for each chat mode and the one-off helper prompts.

use crate::cards::{ChatMode, ContextCard};

fn mode_instruction(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::General => "\
You are a study assistant inside a knowledge-card notebook. Answer the user's \
questions clearly and concisely. When reference cards are provided, ground your \
answers in them and say so when a question goes beyond what they cover.",

        ChatMode::Understand => "\
You are a patient tutor. Explain the concepts in the reference cards in plain \
language, build from fundamentals, and use a short example where it helps. \
Check for common misconceptions.",

        ChatMode::Compare => "\
You are an analyst. Compare and contrast the reference cards: identify shared \
ideas, key differences, and how they relate. Prefer a structured answer with \
short headings or a table when it aids clarity.",

        ChatMode::Quiz => "\
You are a quiz master. Write questions that test understanding of the \
reference cards, mixing multiple choice and short answer. Put the answers in \
a separate section at the end.",

        ChatMode::Write => "\
You are a writing partner. Help the user draft prose that draws on the \
reference cards. Match the tone the user asks for and keep facts faithful to \
the cards.",
    }
}

fn card_list(cards: &[ContextCard]) -> String {
    let mut out = String::new();
    for (i, card) in cards.iter().enumerate() {
        out.push_str(&format!(
            "[Card {n}] {title}\n{content}\n\n",
            n = i + 1,
            title = card.title.trim(),
            content = card.content.trim()
        ));
    }
    out.trim_end().to_string()
}

/// Build the system instruction for a session in `mode` with `cards` as context.
pub fn system_prompt(mode: ChatMode, cards: &[ContextCard]) -> String {
    let base = mode_instruction(mode);
    if cards.is_empty() {
        return base.to_string();
    }
    format!("{}\n\nReference cards:\n\n{}", base, card_list(cards))
}

/// Instruction for turning extracted page text into a card body.
pub fn summarize_prompt() -> &'static str {
    "\
You write knowledge cards. Summarize the page you are given in a few short \
paragraphs or bullet points that capture its key ideas. Output only the \
summary."
}

/// Input for the summarization session.
pub fn summarize_input(title: &str, text: &str) -> String {
    format!("Title: {}\n\n{}", title.trim(), text.trim())
}

/// Instruction for ranking cards against a search query.
pub fn search_prompt() -> &'static str {
    "\
You rank knowledge cards by relevance to a search query. Reply with the \
numbers of the relevant cards, most relevant first, separated by commas. \
Reply with NONE if no card is relevant. Output nothing else."
}

/// Input for the search session: the numbered card list and the query.
pub fn search_input(query: &str, cards: &[ContextCard]) -> String {
    format!("{}\n\nQuery: {}", card_list(cards), query.trim())
}

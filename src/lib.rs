//! cardmind: chat assistant core for a knowledge-card notebook.

pub mod assistant;
pub mod cards;
pub mod config;
pub mod error;
pub mod llm;

pub use assistant::ChatAssistant;

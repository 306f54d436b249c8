//! Knowledge cards as seen by the assistant: context material for sessions.

pub mod file;
pub mod model;

pub use file::load_cards;
pub use model::{ChatMode, ContextCard};

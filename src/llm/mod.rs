//! Language model integration for cardmind.
//!
//! - `host`: the `LanguageModelHost` / `ModelSession` traits the assistant
//!   core is written against, plus `UnsupportedHost` for environments with
//!   no model at all.
//! - `ollama`: a host backed by a local Ollama server.

pub mod host;
pub mod ollama;

pub use host::{
    Availability, DownloadMonitor, FragmentStream, LanguageModelHost, ModelSession,
    SessionOptions, UnsupportedHost,
};
pub use ollama::{OllamaHost, OllamaSession};

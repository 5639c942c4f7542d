//! Generative backends implementing [`BatchSource`](crate::source::BatchSource).

pub mod ollama;

pub use ollama::{BackendHealth, OllamaSource, build_prompt, check_health, parse_response};

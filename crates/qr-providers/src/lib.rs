//! qr-providers: LLM provider implementations for quick-research
//!
//! The research loop talks to a single OpenAI-compatible chat-completions
//! endpoint; point `base_url` at Ollama or any other compatible server.

pub mod openai;

pub use openai::OpenAIProvider;

//! LLM provider implementations for netintent.
//!
//! All providers implement the `netintent_core::Provider` trait. Groq,
//! OpenAI, Ollama and vLLM all speak the same OpenAI-compatible protocol,
//! so one implementation covers them.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

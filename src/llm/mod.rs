//! LLM integration module.
//!
//! Provides an OpenAI-compatible client used by the semantic-metrics judge.

mod client;

pub use client::{LlmClient, Message, Role};

//! Model abstractions for completion and embedding providers.
//!
//! This module provides:
//! - [`traits::CompletionBackend`] and [`traits::EmbeddingProvider`] -- the
//!   contracts the rest of the crate depends on.
//! - [`api::LlmClient`] -- OpenAI-compatible chat completion client.
//! - [`embedding::EmbeddingClient`] -- OpenAI-compatible embedding client.
//! - [`offline`] -- deterministic stand-ins for tests and offline runs.
//! - [`prompt`] -- decision-loop templates and their rendering helpers.

pub mod api;
pub mod embedding;
pub mod offline;
pub mod prompt;
pub mod traits;

pub use api::{ChatMessage, ChatResponse, Choice, LlmClient, Usage};
pub use embedding::EmbeddingClient;
pub use offline::{HashEmbedder, ScriptedBackend};
pub use traits::{CompletionBackend, EmbeddingProvider};

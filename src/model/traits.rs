//! Provider contracts the memory and the decision loop are written against.
//!
//! Concrete HTTP clients live in [`super::api`] and [`super::embedding`];
//! deterministic offline implementations live in [`super::offline`].

use anyhow::Result;

use super::api::ChatMessage;

/// A chat-style completion backend.
#[allow(async_fn_in_trait)]
pub trait CompletionBackend: Send + Sync {
    /// Complete the conversation and return the generated text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Turns text into fixed-dimension vectors.
#[allow(async_fn_in_trait)]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Output order matches input order and an empty
    /// input yields an empty output.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            anyhow::bail!(
                "embedding provider returned {} vectors for a single input",
                vectors.len()
            );
        }
        Ok(vectors.remove(0))
    }

    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;
}

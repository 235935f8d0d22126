//! Deterministic, network-free collaborators.
//!
//! - [`HashEmbedder`] hashes lowercase word tokens into a fixed number of
//!   buckets. Texts sharing words score high; it carries no semantics beyond
//!   that.
//! - [`ScriptedBackend`] answers completions from a fixed script and keeps a
//!   log of every conversation it was sent.

use std::sync::Mutex;

use anyhow::Result;

use super::api::ChatMessage;
use super::traits::{CompletionBackend, EmbeddingProvider};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

// ---------------------------------------------------------------------------
// Hash embedder
// ---------------------------------------------------------------------------

/// Bag-of-words feature hashing embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ---------------------------------------------------------------------------
// Scripted completion backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Script {
    Fixed(String),
    /// Answers in order; the last one repeats once the list runs out.
    Sequence(Vec<String>),
}

/// A completion backend that replays scripted answers.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Script,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    /// Always answer with `answer`.
    pub fn fixed(answer: impl Into<String>) -> Self {
        Self {
            script: Script::Fixed(answer.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer with each entry of `answers` in turn.
    pub fn sequence<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Script::Sequence(answers.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every conversation received so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted backend call log poisoned"))?;
        let index = calls.len();
        calls.push(messages.to_vec());

        match &self.script {
            Script::Fixed(answer) => Ok(answer.clone()),
            Script::Sequence(answers) => answers
                .get(index)
                .or_else(|| answers.last())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("scripted backend has no answers")),
        }
    }
}

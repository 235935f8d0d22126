//! Core environment trait and shared types.
//!
//! The decision loop drives every task environment through [`Environment`]:
//! one `reset` per episode, then one `step` per chosen action.

use serde::{Deserialize, Serialize};

/// What the environment answers to one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvResponse {
    /// The textual observation the agent sees next.
    pub observation: String,
    /// Whether the episode has terminated.
    #[serde(default)]
    pub done: bool,
    /// Whether the goal has been achieved. Only meaningful once `done`, but
    /// carried on every response.
    #[serde(default)]
    pub success: bool,
}

impl EnvResponse {
    pub fn ongoing(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            done: false,
            success: false,
        }
    }

    pub fn finished(observation: impl Into<String>, success: bool) -> Self {
        Self {
            observation: observation.into(),
            done: true,
            success,
        }
    }
}

/// A task environment the decision loop can act in.
#[allow(async_fn_in_trait)]
pub trait Environment: Send + Sync {
    /// Start a new episode for `goal` and return the initial observation.
    async fn reset(&mut self, goal: &str) -> anyhow::Result<String>;

    /// Execute an action and return the resulting observation and status.
    async fn step(&mut self, action: &str) -> anyhow::Result<EnvResponse>;
}

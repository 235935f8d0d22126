//! Example retrieval for the decision loop, with per-episode credit tracking.
//!
//! Every trajectory whose steps are handed to a prompt during an episode is
//! remembered; when the episode ends, its outcome is recorded against all of
//! them.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use super::store::TrajectoryStore;
use super::types::StepExample;
use crate::model::EmbeddingProvider;
use crate::storage::StorageAdapter;

/// Wraps a [`TrajectoryStore`] to answer "which examples fit this context".
#[derive(Debug)]
pub struct Retriever<S, E> {
    store: TrajectoryStore<S, E>,
    default_k: usize,
    retrieved: HashSet<String>,
}

impl<S: StorageAdapter, E: EmbeddingProvider> Retriever<S, E> {
    pub fn new(store: TrajectoryStore<S, E>, default_k: usize) -> Self {
        Self {
            store,
            default_k,
            retrieved: HashSet::new(),
        }
    }

    /// Examples for the planning phase, searched by the goal alone.
    pub async fn retrieve_for_plan(
        &mut self,
        goal: &str,
        k: Option<usize>,
    ) -> Result<Vec<StepExample>> {
        let k = k.unwrap_or(self.default_k);
        let examples = self.store.search_steps(goal, k).await?;
        self.track(&examples);
        debug!(k, found = examples.len(), "retrieved examples for plan");
        Ok(examples)
    }

    /// Examples for one loop iteration.
    ///
    /// The query is `goal + observation`; the plan is accepted for symmetry
    /// with the prompt fields but left out of the query.
    pub async fn retrieve_for_step(
        &mut self,
        goal: &str,
        _plan: &str,
        observation: &str,
        k: Option<usize>,
    ) -> Result<Vec<StepExample>> {
        let k = k.unwrap_or(self.default_k);
        let query = format!("{goal}\n{observation}");
        let examples = self.store.search_steps(&query, k).await?;
        self.track(&examples);
        debug!(k, found = examples.len(), "retrieved examples for step");
        Ok(examples)
    }

    fn track(&mut self, examples: &[StepExample]) {
        self.retrieved
            .extend(examples.iter().map(|e| e.trajectory_id.clone()));
    }

    /// Credit (or blame) every trajectory retrieved since the last reset with
    /// the episode outcome, then forget them.
    pub async fn record_episode_result(&mut self, success: bool) -> Result<()> {
        let retrieved = std::mem::take(&mut self.retrieved);
        debug!(
            trajectories = retrieved.len(),
            success,
            "recording episode result"
        );
        for id in retrieved {
            self.store.record_retrieval(&id, success).await?;
        }
        Ok(())
    }

    /// Forget retrieved trajectories without recording anything.
    pub fn clear_retrieved(&mut self) {
        self.retrieved.clear();
    }

    /// Trajectory ids retrieved since the last reset, in no particular order.
    pub fn retrieved_ids(&self) -> impl Iterator<Item = &str> {
        self.retrieved.iter().map(String::as_str)
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn store(&self) -> &TrajectoryStore<S, E> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TrajectoryStore<S, E> {
        &mut self.store
    }

    pub fn into_store(self) -> TrajectoryStore<S, E> {
        self.store
    }
}

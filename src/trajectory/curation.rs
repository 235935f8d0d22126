//! Periodic pruning of trajectories that stopped helping.
//!
//! [`CurationManager`] is a counter, not a background task: the caller ticks
//! it once per stored episode via [`CurationManager::maybe_curate`], and every
//! `curate_every` ticks it runs [`CurationManager::curate`].

use std::collections::HashMap;

use anyhow::Result;
use tracing::info;

use super::store::TrajectoryStore;
use super::types::CurationMetadata;
use crate::config::CurationConfig;
use crate::model::EmbeddingProvider;
use crate::storage::StorageAdapter;

#[derive(Debug, Clone)]
pub struct CurationManager {
    config: CurationConfig,
    episodes_since_curation: usize,
}

impl CurationManager {
    pub fn new(config: CurationConfig) -> Self {
        Self {
            config,
            episodes_since_curation: 0,
        }
    }

    /// Count one episode; curate and reset the counter when the threshold is
    /// reached. Returns the ids removed (empty when curation did not run).
    pub async fn maybe_curate<S, E>(
        &mut self,
        store: &mut TrajectoryStore<S, E>,
    ) -> Result<Vec<String>>
    where
        S: StorageAdapter,
        E: EmbeddingProvider,
    {
        self.episodes_since_curation += 1;
        if self.episodes_since_curation < self.config.curate_every {
            return Ok(Vec::new());
        }
        self.episodes_since_curation = 0;
        self.curate(store).await
    }

    /// Remove every trajectory that has been retrieved at least
    /// `min_retrievals` times and whose utility is below `threshold`.
    pub async fn curate<S, E>(&self, store: &mut TrajectoryStore<S, E>) -> Result<Vec<String>>
    where
        S: StorageAdapter,
        E: EmbeddingProvider,
    {
        let candidates: Vec<String> = self
            .get_low_utility_trajectories(store)
            .into_iter()
            .map(|m| m.trajectory_id)
            .collect();

        let mut removed = Vec::with_capacity(candidates.len());
        for id in candidates {
            if store.remove(&id).await? {
                removed.push(id);
            }
        }

        info!(
            checked = store.len() + removed.len(),
            removed = removed.len(),
            threshold = self.config.threshold,
            "curation complete"
        );
        Ok(removed)
    }

    /// Records curation would remove right now.
    pub fn get_low_utility_trajectories<S, E>(
        &self,
        store: &TrajectoryStore<S, E>,
    ) -> Vec<CurationMetadata>
    where
        S: StorageAdapter,
        E: EmbeddingProvider,
    {
        store
            .all_curation()
            .into_iter()
            .filter(|m| self.is_prunable(m))
            .collect()
    }

    /// Current utility of every trajectory, keyed by id.
    pub fn get_utility_scores<S, E>(&self, store: &TrajectoryStore<S, E>) -> HashMap<String, f64>
    where
        S: StorageAdapter,
        E: EmbeddingProvider,
    {
        store
            .all_curation()
            .into_iter()
            .map(|m| (m.trajectory_id, m.utility_score))
            .collect()
    }

    fn is_prunable(&self, meta: &CurationMetadata) -> bool {
        meta.times_retrieved >= self.config.min_retrievals
            && meta.utility_score < self.config.threshold
    }

    pub fn episodes_since_curation(&self) -> usize {
        self.episodes_since_curation
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::model::HashEmbedder;
    use crate::storage::MemoryStorage;
    use crate::trajectory::types::Trajectory;

    async fn store_with(n: usize) -> (TrajectoryStore<MemoryStorage, HashEmbedder>, Vec<String>) {
        let mut store = TrajectoryStore::new(
            MemoryStorage::new(),
            HashEmbedder::new(32),
            StoreConfig::default(),
        );
        let mut ids = Vec::new();
        for i in 0..n {
            ids.push(
                store
                    .add(Trajectory::new(format!("goal {i}"), "plan", vec![], true))
                    .await
                    .unwrap(),
            );
        }
        (store, ids)
    }

    fn manager(curate_every: usize, min_retrievals: u64, threshold: f64) -> CurationManager {
        CurationManager::new(CurationConfig {
            curate_every,
            min_retrievals,
            threshold,
        })
    }

    #[tokio::test]
    async fn test_floor_protects_rarely_retrieved() {
        let (mut store, ids) = store_with(1).await;
        for _ in 0..4 {
            store.record_retrieval(&ids[0], false).await.unwrap();
        }
        assert_eq!(store.curation(&ids[0]).unwrap().utility_score, 0.0);

        let manager = manager(1, 5, 0.3);
        assert!(manager.get_low_utility_trajectories(&store).is_empty());
        assert!(manager.curate(&mut store).await.unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_maybe_curate_runs_every_n_episodes() {
        let (mut store, ids) = store_with(2).await;
        for _ in 0..6 {
            store.record_retrieval(&ids[0], false).await.unwrap();
            store.record_retrieval(&ids[1], true).await.unwrap();
        }

        let mut manager = manager(3, 5, 0.5);
        assert!(manager.maybe_curate(&mut store).await.unwrap().is_empty());
        assert!(manager.maybe_curate(&mut store).await.unwrap().is_empty());
        assert_eq!(manager.episodes_since_curation(), 2);
        assert_eq!(store.len(), 2);

        let removed = manager.maybe_curate(&mut store).await.unwrap();
        assert_eq!(removed, vec![ids[0].clone()]);
        assert_eq!(manager.episodes_since_curation(), 0);
        assert!(store.get(&ids[0]).is_none());
        assert!(store.get(&ids[1]).is_some());
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let (mut store, ids) = store_with(2).await;
        for _ in 0..5 {
            store.record_retrieval(&ids[0], false).await.unwrap();
        }
        let manager = manager(10, 5, 0.3);

        let low = manager.get_low_utility_trajectories(&store);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].trajectory_id, ids[0]);

        let scores = manager.get_utility_scores(&store);
        assert_eq!(scores[&ids[0]], 0.0);
        assert_eq!(scores[&ids[1]], 1.0);
        assert_eq!(store.len(), 2);
    }
}

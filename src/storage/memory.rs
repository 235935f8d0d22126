//! Volatile storage adapter. State lives only as long as the value.

use std::collections::BTreeMap;

use anyhow::Result;

use super::index::EmbeddingIndex;
use super::traits::StorageAdapter;
use crate::trajectory::types::{
    CurationMetadata, EmbeddingKind, SearchHit, StoredEmbedding, Trajectory,
};

/// A [`StorageAdapter`] that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    trajectories: BTreeMap<String, Trajectory>,
    curation: BTreeMap<String, CurationMetadata>,
    index: EmbeddingIndex,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored embeddings of every kind.
    pub fn embedding_count(&self) -> usize {
        self.index.len()
    }
}

impl StorageAdapter for MemoryStorage {
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn save_trajectory(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.trajectories
            .insert(trajectory.id.clone(), trajectory.clone());
        Ok(())
    }

    async fn get_trajectory(&self, id: &str) -> Result<Option<Trajectory>> {
        Ok(self.trajectories.get(id).cloned())
    }

    async fn load_trajectories(&self) -> Result<Vec<Trajectory>> {
        Ok(self.trajectories.values().cloned().collect())
    }

    async fn delete_trajectory(&mut self, id: &str) -> Result<bool> {
        Ok(self.trajectories.remove(id).is_some())
    }

    async fn save_curation(&mut self, meta: &CurationMetadata) -> Result<()> {
        self.curation
            .insert(meta.trajectory_id.clone(), meta.clone());
        Ok(())
    }

    async fn get_curation(&self, trajectory_id: &str) -> Result<Option<CurationMetadata>> {
        Ok(self.curation.get(trajectory_id).cloned())
    }

    async fn load_curation(&self) -> Result<Vec<CurationMetadata>> {
        Ok(self.curation.values().cloned().collect())
    }

    async fn delete_curation(&mut self, trajectory_id: &str) -> Result<bool> {
        Ok(self.curation.remove(trajectory_id).is_some())
    }

    async fn save_embeddings(&mut self, embeddings: Vec<StoredEmbedding>) -> Result<()> {
        for embedding in embeddings {
            self.index.upsert(embedding);
        }
        Ok(())
    }

    async fn search_by_embedding(
        &self,
        query: &[f32],
        kind: EmbeddingKind,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.index.search(query, kind, k))
    }

    async fn embeddings_for_trajectory(
        &self,
        trajectory_id: &str,
    ) -> Result<Vec<StoredEmbedding>> {
        Ok(self.index.records_for(trajectory_id).cloned().collect())
    }

    async fn delete_embeddings_for_trajectory(&mut self, trajectory_id: &str) -> Result<usize> {
        Ok(self.index.remove_trajectory(trajectory_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trajectory_crud() {
        let mut storage = MemoryStorage::new();
        let t = Trajectory::new("goal", "plan", vec![], true);

        storage.save_trajectory(&t).await.unwrap();
        assert_eq!(storage.get_trajectory(&t.id).await.unwrap(), Some(t.clone()));
        assert_eq!(storage.load_trajectories().await.unwrap().len(), 1);
        assert!(storage.delete_trajectory(&t.id).await.unwrap());
        assert!(!storage.delete_trajectory(&t.id).await.unwrap());
        assert!(storage.get_trajectory(&t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_curation_upsert() {
        let mut storage = MemoryStorage::new();
        let mut meta = CurationMetadata::new("t1");
        storage.save_curation(&meta).await.unwrap();
        meta.record_retrieval(true);
        storage.save_curation(&meta).await.unwrap();

        let all = storage.load_curation().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].times_retrieved, 1);
        assert!(storage.delete_curation("t1").await.unwrap());
        assert!(storage.get_curation("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_embeddings_delete_by_trajectory() {
        let mut storage = MemoryStorage::new();
        storage
            .save_embedding(StoredEmbedding::for_trajectory("a", vec![1.0, 0.0]))
            .await
            .unwrap();
        storage
            .save_embeddings(vec![
                StoredEmbedding::for_step("a", 0, vec![1.0, 0.0]),
                StoredEmbedding::for_trajectory("b", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(storage.embedding_count(), 3);
        assert_eq!(storage.embeddings_for_trajectory("a").await.unwrap().len(), 2);

        assert_eq!(storage.delete_embeddings_for_trajectory("a").await.unwrap(), 2);
        let hits = storage
            .search_by_embedding(&[1.0, 0.0], EmbeddingKind::Trajectory, 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].trajectory_id, "b");
    }
}

//! The persistence contract consumed by the trajectory store.
//!
//! The store depends only on [`StorageAdapter`]; every backend is an
//! independent implementation of it.

use anyhow::Result;

use crate::trajectory::types::{
    CurationMetadata, EmbeddingKind, SearchHit, StoredEmbedding, Trajectory,
};

/// Durable key/value persistence for trajectories, curation metadata and
/// embedding vectors.
///
/// A call that returns `Ok` has completed its write. Loading methods skip
/// records that fail to parse (logging a warning) rather than failing the
/// whole load.
#[allow(async_fn_in_trait)]
pub trait StorageAdapter: Send + Sync {
    /// Prepare the backend and read any existing state into memory.
    async fn initialize(&mut self) -> Result<()>;

    // -- trajectories -------------------------------------------------------

    async fn save_trajectory(&mut self, trajectory: &Trajectory) -> Result<()>;

    async fn get_trajectory(&self, id: &str) -> Result<Option<Trajectory>>;

    async fn load_trajectories(&self) -> Result<Vec<Trajectory>>;

    /// Returns whether a trajectory existed.
    async fn delete_trajectory(&mut self, id: &str) -> Result<bool>;

    // -- curation metadata --------------------------------------------------

    /// Insert or replace the record for `meta.trajectory_id`.
    async fn save_curation(&mut self, meta: &CurationMetadata) -> Result<()>;

    async fn get_curation(&self, trajectory_id: &str) -> Result<Option<CurationMetadata>>;

    async fn load_curation(&self) -> Result<Vec<CurationMetadata>>;

    /// Returns whether a record existed.
    async fn delete_curation(&mut self, trajectory_id: &str) -> Result<bool>;

    // -- embeddings ---------------------------------------------------------

    async fn save_embedding(&mut self, embedding: StoredEmbedding) -> Result<()> {
        self.save_embeddings(vec![embedding]).await
    }

    async fn save_embeddings(&mut self, embeddings: Vec<StoredEmbedding>) -> Result<()>;

    /// Top-`k` embeddings of `kind` by cosine similarity, best first.
    async fn search_by_embedding(
        &self,
        query: &[f32],
        kind: EmbeddingKind,
        k: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn embeddings_for_trajectory(&self, trajectory_id: &str)
        -> Result<Vec<StoredEmbedding>>;

    /// Delete every embedding owned by `trajectory_id`; returns the count.
    async fn delete_embeddings_for_trajectory(&mut self, trajectory_id: &str) -> Result<usize>;
}

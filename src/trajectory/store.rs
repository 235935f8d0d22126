//! The trajectory store: canonical owner of every trajectory and everything
//! derived from it.
//!
//! All reads and writes go through a [`StorageAdapter`]; the store keeps
//! in-memory caches of trajectories, curation metadata and step examples for
//! fast lookup. Mutating methods take `&mut self`, so a store shared between
//! concurrent episodes must sit behind a single writer (e.g. a
//! `tokio::sync::Mutex`).

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::types::{
    CurationMetadata, EmbeddingKind, SearchHit, StepExample, StoredEmbedding, Trajectory,
};
use crate::config::StoreConfig;
use crate::model::prompt::truncate_chars;
use crate::model::EmbeddingProvider;
use crate::storage::StorageAdapter;

/// Owns trajectories, their curation metadata, embeddings and step examples.
#[derive(Debug)]
pub struct TrajectoryStore<S, E> {
    storage: S,
    embedder: E,
    config: StoreConfig,
    trajectories: BTreeMap<String, Trajectory>,
    curation: HashMap<String, CurationMetadata>,
    examples: HashMap<String, Vec<StepExample>>,
    loaded: bool,
}

impl<S: StorageAdapter, E: EmbeddingProvider> TrajectoryStore<S, E> {
    pub fn new(storage: S, embedder: E, config: StoreConfig) -> Self {
        Self {
            storage,
            embedder,
            config,
            trajectories: BTreeMap::new(),
            curation: HashMap::new(),
            examples: HashMap::new(),
            loaded: false,
        }
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Populate the caches from storage, replacing whatever they held.
    ///
    /// Records that fail to parse are skipped by the adapter. A trajectory
    /// found without curation metadata gets a fresh optimistic record, and
    /// one whose embeddings are missing or incomplete is embedded again.
    pub async fn load(&mut self) -> Result<()> {
        self.storage
            .initialize()
            .await
            .context("failed to initialise trajectory storage")?;

        let trajectories = self
            .storage
            .load_trajectories()
            .await
            .context("failed to load trajectories")?;
        let curation = self
            .storage
            .load_curation()
            .await
            .context("failed to load curation metadata")?;

        self.trajectories.clear();
        self.curation.clear();
        self.examples.clear();

        for trajectory in trajectories {
            self.examples
                .insert(trajectory.id.clone(), trajectory.step_examples());
            self.trajectories
                .insert(trajectory.id.clone(), trajectory);
        }

        for meta in curation {
            if self.trajectories.contains_key(&meta.trajectory_id) {
                self.curation.insert(meta.trajectory_id.clone(), meta);
            } else {
                warn!(
                    trajectory_id = %meta.trajectory_id,
                    "ignoring curation metadata for unknown trajectory"
                );
            }
        }

        let missing: Vec<String> = self
            .trajectories
            .keys()
            .filter(|id| !self.curation.contains_key(*id))
            .cloned()
            .collect();
        for id in missing {
            warn!(trajectory_id = %id, "trajectory had no curation metadata; creating one");
            let meta = CurationMetadata::new(&id);
            self.storage.save_curation(&meta).await?;
            self.curation.insert(id, meta);
        }

        self.repair_embeddings().await?;

        self.loaded = true;
        info!(
            trajectories = self.trajectories.len(),
            curation = self.curation.len(),
            step_examples = self.step_count(),
            "trajectory store loaded"
        );
        Ok(())
    }

    /// Re-embed every trajectory whose stored embeddings do not cover its
    /// goal and each of its steps. A provider failure leaves the trajectory
    /// unsearchable until the next load.
    async fn repair_embeddings(&mut self) -> Result<()> {
        let mut stale = Vec::new();
        for trajectory in self.trajectories.values() {
            let stored = self
                .storage
                .embeddings_for_trajectory(&trajectory.id)
                .await?
                .len();
            if stored != trajectory.steps.len() + 1 {
                stale.push((trajectory.id.clone(), stored));
            }
        }

        for (id, stored) in stale {
            let Some(trajectory) = self.trajectories.get(&id) else {
                continue;
            };
            warn!(trajectory_id = %id, stored, "trajectory embeddings incomplete; re-embedding");
            let embeddings = match self.embed_trajectory(trajectory).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(trajectory_id = %id, error = %e, "re-embedding failed");
                    continue;
                }
            };
            self.storage.delete_embeddings_for_trajectory(&id).await?;
            self.storage.save_embeddings(embeddings).await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load on first use. Every mutating method calls this, so writes never
    /// start from empty caches over existing data.
    pub async fn ensure_loaded(&mut self) -> Result<()> {
        if !self.loaded {
            self.load().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Add a trajectory, returning its id.
    ///
    /// Embeddings are computed before anything is written, so a provider
    /// failure leaves the store untouched. If a later write fails, whatever
    /// was already written is rolled back.
    pub async fn add(&mut self, mut trajectory: Trajectory) -> Result<String> {
        self.ensure_loaded().await?;
        if trajectory.id.is_empty() {
            trajectory.id = uuid::Uuid::new_v4().to_string();
        }
        let id = trajectory.id.clone();
        if self.trajectories.contains_key(&id) {
            anyhow::bail!("trajectory {id} is already stored; remove it before re-adding");
        }

        let embeddings = self.embed_trajectory(&trajectory).await?;
        let meta = CurationMetadata::new(&id);

        if let Err(e) = self.persist_new(&trajectory, &meta, embeddings).await {
            self.rollback(&id).await;
            return Err(e.context(format!("failed to store trajectory {id}")));
        }

        info!(
            trajectory_id = %id,
            steps = trajectory.steps.len(),
            success = trajectory.success,
            "trajectory added"
        );
        self.examples
            .insert(id.clone(), trajectory.step_examples());
        self.curation.insert(id.clone(), meta);
        self.trajectories.insert(id.clone(), trajectory);
        Ok(id)
    }

    async fn embed_trajectory(&self, trajectory: &Trajectory) -> Result<Vec<StoredEmbedding>> {
        let limit = self.config.embedding_text_limit;
        let text = trajectory.embedding_text();
        let trajectory_vector = self
            .embedder
            .embed_single(truncate_chars(&text, limit))
            .await
            .context("failed to embed trajectory text")?;

        let mut embeddings = vec![StoredEmbedding::for_trajectory(
            &trajectory.id,
            trajectory_vector,
        )];

        if !trajectory.steps.is_empty() {
            let step_texts: Vec<String> = trajectory
                .steps
                .iter()
                .map(|s| truncate_chars(&s.embedding_text(), limit).to_string())
                .collect();
            let step_vectors = self
                .embedder
                .embed(&step_texts)
                .await
                .context("failed to embed step texts")?;
            if step_vectors.len() != step_texts.len() {
                anyhow::bail!(
                    "embedding provider returned {} vectors for {} steps",
                    step_vectors.len(),
                    step_texts.len()
                );
            }
            embeddings.extend(
                step_vectors
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| StoredEmbedding::for_step(&trajectory.id, i, v)),
            );
        }
        Ok(embeddings)
    }

    async fn persist_new(
        &mut self,
        trajectory: &Trajectory,
        meta: &CurationMetadata,
        embeddings: Vec<StoredEmbedding>,
    ) -> Result<()> {
        self.storage.save_trajectory(trajectory).await?;
        self.storage.save_curation(meta).await?;
        self.storage.save_embeddings(embeddings).await?;
        Ok(())
    }

    async fn rollback(&mut self, id: &str) {
        if let Err(e) = self.delete_from_storage(id).await {
            warn!(trajectory_id = %id, error = %e, "rollback after failed add was incomplete");
        }
    }

    /// Dependents go first, so a failure part way never leaves records
    /// owned by a trajectory that no longer exists.
    async fn delete_from_storage(&mut self, id: &str) -> Result<bool> {
        let embeddings = self.storage.delete_embeddings_for_trajectory(id).await?;
        let had_curation = self.storage.delete_curation(id).await?;
        let had_trajectory = self.storage.delete_trajectory(id).await?;
        Ok(had_trajectory || had_curation || embeddings > 0)
    }

    /// Remove a trajectory with its metadata, embeddings and step examples.
    /// Returns whether anything existed.
    ///
    /// The caches are only updated once storage has deleted everything; on
    /// error the trajectory stays visible and the call can be retried.
    pub async fn remove(&mut self, id: &str) -> Result<bool> {
        self.ensure_loaded().await?;
        let stored = self.delete_from_storage(id).await?;

        let cached = self.trajectories.remove(id).is_some();
        self.curation.remove(id);
        self.examples.remove(id);
        let removed = cached || stored;
        if removed {
            info!(trajectory_id = %id, "trajectory removed");
        }
        Ok(removed)
    }

    /// Count one retrieval of `id` and refresh its utility. Unknown ids are
    /// ignored.
    pub async fn record_retrieval(&mut self, id: &str, led_to_success: bool) -> Result<()> {
        self.ensure_loaded().await?;
        let Some(mut meta) = self.curation.get(id).cloned() else {
            debug!(trajectory_id = %id, "no curation metadata; retrieval not recorded");
            return Ok(());
        };
        meta.record_retrieval(led_to_success);
        self.storage.save_curation(&meta).await?;
        debug!(
            trajectory_id = %id,
            times_retrieved = meta.times_retrieved,
            times_led_to_success = meta.times_led_to_success,
            utility = meta.utility_score,
            "retrieval recorded"
        );
        self.curation.insert(id.to_string(), meta);
        Ok(())
    }

    /// Attach an externally computed persistence score and refresh utility.
    /// Unknown ids are ignored.
    pub async fn set_persistence_score(&mut self, id: &str, score: f64) -> Result<()> {
        self.ensure_loaded().await?;
        let Some(mut meta) = self.curation.get(id).cloned() else {
            return Ok(());
        };
        meta.persistence_score = Some(score);
        meta.recompute_utility();
        self.storage.save_curation(&meta).await?;
        self.curation.insert(id.to_string(), meta);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Top-`k` trajectories by similarity of `goal + plan` to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Trajectory>> {
        if self.trajectories.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.search_hits(query, EmbeddingKind::Trajectory, k).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| self.trajectories.get(&hit.trajectory_id).cloned())
            .collect())
    }

    /// Top-`k` step examples by similarity of `observation + reasoning` to
    /// `query`.
    pub async fn search_steps(&self, query: &str, k: usize) -> Result<Vec<StepExample>> {
        if self.step_count() == 0 || k == 0 {
            return Ok(Vec::new());
        }
        let hits = self.search_hits(query, EmbeddingKind::Step, k).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let index = hit.step_index?;
                self.examples.get(&hit.trajectory_id)?.get(index).cloned()
            })
            .collect())
    }

    async fn search_hits(
        &self,
        query: &str,
        kind: EmbeddingKind,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let query = truncate_chars(query, self.config.embedding_text_limit);
        let vector = self
            .embedder
            .embed_single(query)
            .await
            .context("failed to embed search query")?;
        self.storage.search_by_embedding(&vector, kind, k).await
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&Trajectory> {
        self.trajectories.get(id)
    }

    /// Every stored trajectory, ordered by id.
    pub fn get_all(&self) -> Vec<Trajectory> {
        self.trajectories.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn curation(&self, id: &str) -> Option<&CurationMetadata> {
        self.curation.get(id)
    }

    /// Every curation record, ordered by trajectory id.
    pub fn all_curation(&self) -> Vec<CurationMetadata> {
        let mut all: Vec<CurationMetadata> = self.curation.values().cloned().collect();
        all.sort_by(|a, b| a.trajectory_id.cmp(&b.trajectory_id));
        all
    }

    /// Every step example, grouped by trajectory in id order.
    pub fn step_examples(&self) -> Vec<StepExample> {
        self.trajectories
            .keys()
            .filter_map(|id| self.examples.get(id))
            .flatten()
            .cloned()
            .collect()
    }

    fn step_count(&self) -> usize {
        self.examples.values().map(Vec::len).sum()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}

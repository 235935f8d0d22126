//! The agent facade: decision loop plus trajectory memory.
//!
//! [`Agent::train`] runs an episode and, when it succeeds (and passes the
//! optional verifier), stores it as a future example and ticks curation.
//! [`Agent::run`] runs an episode without storing anything; it still credits
//! the trajectories it retrieved with the outcome.

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::react::DecisionLoop;
use crate::config::TracebankConfig;
use crate::env::Environment;
use crate::model::{CompletionBackend, EmbeddingProvider};
use crate::storage::StorageAdapter;
use crate::trajectory::{
    CurationManager, CurationMetadata, Retriever, Step, Trajectory, TrajectoryStore,
};

/// Future returned by a [`Verifier`].
pub type VerifyFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

/// Extra check a successful trajectory must pass before it is stored.
pub type Verifier = Box<dyn for<'a> Fn(&'a Trajectory) -> VerifyFuture<'a> + Send + Sync>;

/// What one `train` call did.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub trajectory: Trajectory,
    /// Whether the trajectory was added to the store.
    pub stored: bool,
    /// Ids pruned by a curation pass triggered by this episode.
    pub removed: Vec<String>,
}

pub struct Agent<S, E, B> {
    retriever: Retriever<S, E>,
    curation: CurationManager,
    decision_loop: DecisionLoop<B>,
    verifier: Option<Verifier>,
}

impl<S, E, B> Agent<S, E, B>
where
    S: StorageAdapter,
    E: EmbeddingProvider,
    B: CompletionBackend,
{
    /// Assemble an agent over `store`, using `config` for retrieval, curation
    /// and the decision loop.
    pub fn new(store: TrajectoryStore<S, E>, backend: B, config: &TracebankConfig) -> Self {
        Self {
            retriever: Retriever::new(store, config.retrieval.top_k),
            curation: CurationManager::new(config.curation.clone()),
            decision_loop: DecisionLoop::new(backend, config.react.clone()),
            verifier: None,
        }
    }

    pub fn with_verifier<F>(mut self, verifier: F) -> Self
    where
        F: for<'a> Fn(&'a Trajectory) -> VerifyFuture<'a> + Send + Sync + 'static,
    {
        self.verifier = Some(Box::new(verifier));
        self
    }

    pub fn with_step_callback(
        mut self,
        callback: impl Fn(usize, &Step) + Send + Sync + 'static,
    ) -> Self {
        self.decision_loop = self.decision_loop.with_step_callback(callback);
        self
    }

    /// Load the store unless that already happened.
    pub async fn ensure_loaded(&mut self) -> Result<()> {
        self.retriever
            .store_mut()
            .ensure_loaded()
            .await
            .context("failed to load trajectory store")
    }

    // ------------------------------------------------------------------
    // Episodes
    // ------------------------------------------------------------------

    /// Run an episode and keep it if it succeeded and passed verification.
    pub async fn train<En: Environment>(
        &mut self,
        env: &mut En,
        goal: &str,
    ) -> Result<TrainOutcome> {
        self.ensure_loaded().await?;
        let trajectory = self
            .decision_loop
            .run(&mut self.retriever, env, goal)
            .await?;

        if !trajectory.success {
            return Ok(TrainOutcome {
                trajectory,
                stored: false,
                removed: Vec::new(),
            });
        }

        if let Some(verify) = &self.verifier {
            let accepted = verify(&trajectory)
                .await
                .context("trajectory verification failed")?;
            if !accepted {
                warn!(
                    trajectory_id = %trajectory.id,
                    goal = %goal,
                    "trajectory rejected by verifier"
                );
                return Ok(TrainOutcome {
                    trajectory,
                    stored: false,
                    removed: Vec::new(),
                });
            }
        }

        self.retriever
            .store_mut()
            .add(trajectory.clone())
            .await?;
        let removed = self
            .curation
            .maybe_curate(self.retriever.store_mut())
            .await?;
        Ok(TrainOutcome {
            trajectory,
            stored: true,
            removed,
        })
    }

    /// Run an episode without storing the result.
    pub async fn run<En: Environment>(&mut self, env: &mut En, goal: &str) -> Result<Trajectory> {
        self.ensure_loaded().await?;
        self.decision_loop
            .run(&mut self.retriever, env, goal)
            .await
    }

    /// [`Agent::train`] over each goal in turn, each with a fresh environment.
    pub async fn train_batch<En, F>(
        &mut self,
        goals: &[String],
        mut make_env: F,
    ) -> Result<Vec<TrainOutcome>>
    where
        En: Environment,
        F: FnMut() -> En,
    {
        let mut outcomes = Vec::with_capacity(goals.len());
        for goal in goals {
            let mut env = make_env();
            outcomes.push(self.train(&mut env, goal).await?);
        }
        let stored = outcomes.iter().filter(|o| o.stored).count();
        info!(goals = goals.len(), stored, "training batch finished");
        Ok(outcomes)
    }

    /// [`Agent::run`] over each goal in turn, each with a fresh environment.
    pub async fn run_batch<En, F>(
        &mut self,
        goals: &[String],
        mut make_env: F,
    ) -> Result<Vec<Trajectory>>
    where
        En: Environment,
        F: FnMut() -> En,
    {
        let mut trajectories = Vec::with_capacity(goals.len());
        for goal in goals {
            let mut env = make_env();
            trajectories.push(self.run(&mut env, goal).await?);
        }
        let succeeded = trajectories.iter().filter(|t| t.success).count();
        info!(goals = goals.len(), succeeded, "run batch finished");
        Ok(trajectories)
    }

    // ------------------------------------------------------------------
    // Curation
    // ------------------------------------------------------------------

    /// Run a curation pass now, regardless of the episode counter.
    pub async fn curate(&mut self) -> Result<Vec<String>> {
        self.ensure_loaded().await?;
        self.curation.curate(self.retriever.store_mut()).await
    }

    /// What [`Agent::curate`] would remove right now.
    pub async fn low_utility_trajectories(&mut self) -> Result<Vec<CurationMetadata>> {
        self.ensure_loaded().await?;
        Ok(self
            .curation
            .get_low_utility_trajectories(self.retriever.store()))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store(&self) -> &TrajectoryStore<S, E> {
        self.retriever.store()
    }

    pub fn store_mut(&mut self) -> &mut TrajectoryStore<S, E> {
        self.retriever.store_mut()
    }

    pub fn retriever(&self) -> &Retriever<S, E> {
        &self.retriever
    }

    pub fn curation_manager(&self) -> &CurationManager {
        &self.curation
    }

    pub fn decision_loop(&self) -> &DecisionLoop<B> {
        &self.decision_loop
    }
}

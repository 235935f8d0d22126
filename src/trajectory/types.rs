//! Core data types for the trajectory memory.
//!
//! A [`Trajectory`] is the unit of ownership: [`CurationMetadata`],
//! [`StoredEmbedding`]s and [`StepExample`]s all hang off its id and never
//! outlive it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of retrievals needed before the observed success ratio counts as a
/// utility signal.
pub const RETRIEVAL_SCORE_MIN_SAMPLES: u64 = 3;

/// Weight of the observed success ratio in the utility mean.
pub const RETRIEVAL_SCORE_WEIGHT: f64 = 1.0;

/// Weight of the externally supplied persistence signal in the utility mean.
pub const PERSISTENCE_SCORE_WEIGHT: f64 = 2.0;

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// One observation/reasoning/action triple recorded per decision-loop
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// What the environment showed the agent.
    pub observation: String,
    /// The model's free-text reasoning for this step.
    pub reasoning: String,
    /// The action sent to the environment.
    pub action: String,
}

/// A complete recorded episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier. An empty id is replaced with a UUID v4 when the
    /// trajectory is added to a store.
    #[serde(default)]
    pub id: String,
    pub goal: String,
    pub plan: String,
    pub steps: Vec<Step>,
    pub success: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Trajectory {
    /// Create a trajectory with a fresh UUID and empty metadata.
    pub fn new(
        goal: impl Into<String>,
        plan: impl Into<String>,
        steps: Vec<Step>,
        success: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            plan: plan.into(),
            steps,
            success,
            metadata: HashMap::new(),
        }
    }

    /// Text embedded for trajectory-level search.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.goal, self.plan)
    }

    /// Derive the read-only step projections for this trajectory.
    pub fn step_examples(&self) -> Vec<StepExample> {
        self.steps
            .iter()
            .enumerate()
            .map(|(step_index, step)| StepExample {
                trajectory_id: self.id.clone(),
                step_index,
                goal: self.goal.clone(),
                plan: self.plan.clone(),
                observation: step.observation.clone(),
                reasoning: step.reasoning.clone(),
                action: step.action.clone(),
            })
            .collect()
    }
}

impl Step {
    pub fn new(
        observation: impl Into<String>,
        reasoning: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            observation: observation.into(),
            reasoning: reasoning.into(),
            action: action.into(),
        }
    }

    /// Text embedded for step-level search.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.observation, self.reasoning)
    }
}

/// A single step together with its parent's goal and plan, as handed to
/// prompts as an in-context example. Always regenerable from the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExample {
    pub trajectory_id: String,
    pub step_index: usize,
    pub goal: String,
    pub plan: String,
    pub observation: String,
    pub reasoning: String,
    pub action: String,
}

// ---------------------------------------------------------------------------
// Curation metadata
// ---------------------------------------------------------------------------

/// Usage statistics and utility for one trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationMetadata {
    pub trajectory_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub times_retrieved: u64,
    #[serde(default)]
    pub times_led_to_success: u64,
    /// `times_led_to_success / times_retrieved`, once enough samples exist.
    #[serde(default)]
    pub retrieval_score: Option<f64>,
    /// Deferred-validation signal supplied from outside the core.
    #[serde(default)]
    pub persistence_score: Option<f64>,
    #[serde(default = "optimistic_utility")]
    pub utility_score: f64,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub deprecated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
    #[serde(default)]
    pub superseded_by: Option<String>,
}

fn optimistic_utility() -> f64 {
    1.0
}

impl CurationMetadata {
    /// A fresh record with the optimistic utility prior.
    pub fn new(trajectory_id: impl Into<String>) -> Self {
        Self {
            trajectory_id: trajectory_id.into(),
            created_at: Utc::now(),
            times_retrieved: 0,
            times_led_to_success: 0,
            retrieval_score: None,
            persistence_score: None,
            utility_score: optimistic_utility(),
            is_deprecated: false,
            deprecated_at: None,
            deprecation_reason: None,
            superseded_by: None,
        }
    }

    /// Count one retrieval of this trajectory and refresh the utility.
    pub fn record_retrieval(&mut self, led_to_success: bool) {
        self.times_retrieved += 1;
        if led_to_success {
            self.times_led_to_success += 1;
        }
        self.recompute_utility();
    }

    /// Recompute `retrieval_score` and `utility_score` from the counters.
    ///
    /// Utility is the weighted mean of whichever signals are present; with no
    /// signals it stays at the optimistic `1.0`.
    pub fn recompute_utility(&mut self) {
        if self.times_retrieved >= RETRIEVAL_SCORE_MIN_SAMPLES {
            self.retrieval_score =
                Some(self.times_led_to_success as f64 / self.times_retrieved as f64);
        }

        let signals = [
            self.retrieval_score.map(|s| (s, RETRIEVAL_SCORE_WEIGHT)),
            self.persistence_score.map(|s| (s, PERSISTENCE_SCORE_WEIGHT)),
        ];
        let (weighted, total_weight) = signals
            .iter()
            .flatten()
            .fold((0.0, 0.0), |(sum, weight), (score, w)| {
                (sum + score * w, weight + w)
            });

        self.utility_score = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            optimistic_utility()
        };
    }
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Which text an embedding was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    /// `goal + plan` of a whole trajectory.
    Trajectory,
    /// `observation + reasoning` of a single step.
    Step,
}

/// A persisted embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub id: String,
    pub embedding: Vec<f32>,
    #[serde(rename = "type")]
    pub kind: EmbeddingKind,
    pub trajectory_id: String,
    #[serde(default)]
    pub step_index: Option<usize>,
}

impl StoredEmbedding {
    pub fn for_trajectory(trajectory_id: &str, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("{trajectory_id}:trajectory"),
            embedding,
            kind: EmbeddingKind::Trajectory,
            trajectory_id: trajectory_id.to_string(),
            step_index: None,
        }
    }

    pub fn for_step(trajectory_id: &str, step_index: usize, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("{trajectory_id}:step:{step_index}"),
            embedding,
            kind: EmbeddingKind::Step,
            trajectory_id: trajectory_id.to_string(),
            step_index: Some(step_index),
        }
    }
}

/// One ranked result from an embedding search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub trajectory_id: String,
    pub step_index: Option<usize>,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata_is_optimistic() {
        let meta = CurationMetadata::new("t1");
        assert_eq!(meta.utility_score, 1.0);
        assert_eq!(meta.retrieval_score, None);
        assert!(!meta.is_deprecated);
    }

    #[test]
    fn test_utility_stays_optimistic_below_sample_floor() {
        let mut meta = CurationMetadata::new("t1");
        meta.record_retrieval(false);
        meta.record_retrieval(false);
        assert_eq!(meta.times_retrieved, 2);
        assert_eq!(meta.retrieval_score, None);
        assert_eq!(meta.utility_score, 1.0);

        meta.record_retrieval(false);
        assert_eq!(meta.retrieval_score, Some(0.0));
        assert_eq!(meta.utility_score, 0.0);
    }

    #[test]
    fn test_utility_weighted_mean_with_persistence() {
        let mut meta = CurationMetadata::new("t1");
        meta.persistence_score = Some(1.0);
        for success in [true, false, false, false] {
            meta.record_retrieval(success);
        }
        // (0.25 * 1 + 1.0 * 2) / 3
        assert!((meta.utility_score - 0.75).abs() < 1e-12);
        assert_eq!(meta.times_led_to_success, 1);
    }

    #[test]
    fn test_persistence_alone_counts() {
        let mut meta = CurationMetadata::new("t1");
        meta.persistence_score = Some(0.2);
        meta.recompute_utility();
        assert!((meta.utility_score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_step_examples_carry_parent_context() {
        let mut t = Trajectory::new(
            "add 1 and 2",
            "compute the sum",
            vec![Step::new("obs a", "think a", "act a"), Step::new("obs b", "think b", "act b")],
            true,
        );
        t.id = "traj-1".into();

        let examples = t.step_examples();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].trajectory_id, "traj-1");
        assert_eq!(examples[1].step_index, 1);
        assert_eq!(examples[1].goal, "add 1 and 2");
        assert_eq!(examples[1].action, "act b");
    }

    #[test]
    fn test_embedding_kind_serializes_lowercase() {
        let e = StoredEmbedding::for_step("t", 2, vec![0.5]);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "step");
        assert_eq!(json["step_index"], 2);
        assert_eq!(e.id, "t:step:2");
    }

    #[test]
    fn test_trajectory_without_id_deserializes() {
        let t: Trajectory =
            serde_json::from_str(r#"{"goal":"g","plan":"p","steps":[],"success":true}"#).unwrap();
        assert!(t.id.is_empty());
        assert!(t.metadata.is_empty());
    }
}

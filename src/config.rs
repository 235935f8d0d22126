use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete configuration for a tracebank agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracebankConfig {
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    pub curation: CurationConfig,
    pub react: ReactConfig,
    pub model: ModelConfig,
    pub storage: StorageConfig,
}

/// Trajectory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Character cap applied to any text before it is sent for embedding
    /// (default: 2000).
    pub embedding_text_limit: usize,
}

/// Example retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of step examples returned when a call site gives no explicit k
    /// (default: 3).
    pub top_k: usize,
}

/// Curation (pruning) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Run curation once every this many stored episodes (default: 10).
    pub curate_every: usize,
    /// Retrieval floor below which a trajectory is never pruned (default: 5).
    pub min_retrievals: u64,
    /// Utility below which a trajectory above the floor is pruned (default: 0.3).
    pub threshold: f64,
}

/// Per-field character caps applied while rendering prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLimits {
    pub goal: usize,
    pub plan: usize,
    pub observation: usize,
    pub reasoning: usize,
}

/// How the step history is rendered into the `{history}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFormat {
    /// Number of most recent steps shown in full (default: 5).
    pub recent_steps: usize,
    pub observation_chars: usize,
    pub action_chars: usize,
}

/// How retrieved examples are packed into the `{examples}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExampleFormat {
    pub max_examples: usize,
    /// Total character budget for the whole examples block (default: 4000).
    pub total_chars: usize,
    pub goal_chars: usize,
    pub observation_chars: usize,
    pub reasoning_chars: usize,
    pub action_chars: usize,
}

/// Prompt templates for the three decision-loop phases.
///
/// Recognised placeholders: `{goal}`, `{plan}`, `{observation}`,
/// `{reasoning}`, `{history}`, `{examples}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub plan: String,
    pub reasoning: String,
    pub action: String,
}

/// Decision loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactConfig {
    /// Hard cap on loop iterations per episode (default: 30).
    pub max_steps: usize,
    pub limits: PromptLimits,
    pub history: HistoryFormat,
    pub examples: ExampleFormat,
    pub templates: PromptTemplates,
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL for the chat completion API.
    pub chat_api_base: String,
    /// Model identifier for the chat backend (e.g., "gpt-4o-mini").
    pub chat_model_id: String,
    pub chat_api_key: String,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Insert a placeholder user turn when the conversation does not open
    /// with one (some backends reject anything else).
    pub leading_user_turn: bool,
    /// Base URL for the embedding API.
    pub embedding_api_base: String,
    /// Model identifier for embeddings.
    pub embedding_model_id: String,
    pub embedding_api_key: String,
    /// Dimension of the vectors produced by the embedding model.
    pub embedding_dimension: usize,
}

/// Storage configuration for the file-backed adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `trajectories/`, `curation.json` and
    /// `embeddings.json`.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            embedding_text_limit: 2000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            curate_every: 10,
            min_retrievals: 5,
            threshold: 0.3,
        }
    }
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            goal: 4000,
            plan: 2000,
            observation: 5000,
            reasoning: 2000,
        }
    }
}

impl Default for HistoryFormat {
    fn default() -> Self {
        Self {
            recent_steps: 5,
            observation_chars: 300,
            action_chars: 200,
        }
    }
}

impl Default for ExampleFormat {
    fn default() -> Self {
        Self {
            max_examples: 3,
            total_chars: 4000,
            goal_chars: 300,
            observation_chars: 500,
            reasoning_chars: 300,
            action_chars: 250,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            plan: crate::model::prompt::DEFAULT_PLAN_TEMPLATE.to_string(),
            reasoning: crate::model::prompt::DEFAULT_REASONING_TEMPLATE.to_string(),
            action: crate::model::prompt::DEFAULT_ACTION_TEMPLATE.to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            chat_api_base: "https://api.openai.com/v1".into(),
            chat_model_id: "gpt-4o-mini".into(),
            chat_api_key: String::new(),
            temperature: 0.0,
            max_tokens: 1024,
            leading_user_turn: false,
            embedding_api_base: "https://api.openai.com/v1".into(),
            embedding_model_id: "text-embedding-3-small".into(),
            embedding_api_key: String::new(),
            embedding_dimension: 1536,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/memory"),
        }
    }
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            limits: PromptLimits::default(),
            history: HistoryFormat::default(),
            examples: ExampleFormat::default(),
            templates: PromptTemplates::default(),
        }
    }
}

impl TracebankConfig {
    /// Configuration with every default filled in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a (possibly partial) JSON configuration file. Missing fields take
    /// their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Fill empty API keys from `OPENAI_API_KEY`.
    pub fn apply_env_keys(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.model.chat_api_key.is_empty() {
                self.model.chat_api_key = key.clone();
            }
            if self.model.embedding_api_key.is_empty() {
                self.model.embedding_api_key = key;
            }
        }
    }

    /// Reject configurations the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.react.max_steps == 0 {
            anyhow::bail!("react.max_steps must be greater than zero");
        }
        if self.curation.curate_every == 0 {
            anyhow::bail!("curation.curate_every must be greater than zero");
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.curation.threshold) {
            anyhow::bail!(
                "curation.threshold must be within [0, 1], got {}",
                self.curation.threshold
            );
        }
        if self.model.embedding_dimension == 0 {
            anyhow::bail!("model.embedding_dimension must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TracebankConfig::new();
        assert_eq!(config.store.embedding_text_limit, 2000);
        assert_eq!(config.curation.curate_every, 10);
        assert_eq!(config.curation.min_retrievals, 5);
        assert!((config.curation.threshold - 0.3).abs() < 1e-12);
        assert_eq!(config.react.max_steps, 30);
        assert_eq!(config.react.limits.observation, 5000);
        assert_eq!(config.react.examples.max_examples, 3);
        assert!(config.react.templates.plan.contains("{goal}"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"curation": {"threshold": 0.5}}"#).unwrap();

        let config = TracebankConfig::load_from_file(&path).unwrap();
        assert!((config.curation.threshold - 0.5).abs() < 1e-12);
        assert_eq!(config.curation.min_retrievals, 5);
        assert_eq!(config.react.max_steps, 30);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = TracebankConfig::new();
        config.curation.threshold = 1.5;
        assert!(config.validate().is_err());
    }
}

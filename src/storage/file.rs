//! File-backed storage adapter.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/trajectories/<id>.json   one file per trajectory
//! <root>/curation.json           array of every curation record
//! <root>/embeddings.json         array of every stored embedding
//! ```
//!
//! The two aggregate files are held in memory and rewritten in full on every
//! mutating call. They are read before the first such call even when
//! [`StorageAdapter::initialize`] was never invoked, so a write cannot clobber
//! records it has not seen. A file that is not a JSON array fails
//! initialisation and is left untouched on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::index::EmbeddingIndex;
use super::traits::StorageAdapter;
use crate::trajectory::types::{
    CurationMetadata, EmbeddingKind, SearchHit, StoredEmbedding, Trajectory,
};

const TRAJECTORY_DIR: &str = "trajectories";
const CURATION_FILE: &str = "curation.json";
const EMBEDDINGS_FILE: &str = "embeddings.json";

/// A [`StorageAdapter`] persisting plain JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    curation: BTreeMap<String, CurationMetadata>,
    index: EmbeddingIndex,
    initialized: bool,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            curation: BTreeMap::new(),
            index: EmbeddingIndex::new(),
            initialized: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn trajectory_dir(&self) -> PathBuf {
        self.root.join(TRAJECTORY_DIR)
    }

    fn trajectory_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.trajectory_dir().join(format!("{id}.json")))
    }

    async fn ensure_initialized(&mut self) -> Result<()> {
        if !self.initialized {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn persist_curation(&self) -> Result<()> {
        let records: Vec<&CurationMetadata> = self.curation.values().collect();
        write_json(&self.root.join(CURATION_FILE), &records).await
    }

    async fn persist_embeddings(&self) -> Result<()> {
        let records: Vec<&StoredEmbedding> = self.index.records().collect();
        write_json(&self.root.join(EMBEDDINGS_FILE), &records).await
    }
}

/// Ids become file names, so anything that could escape the directory is
/// rejected.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        anyhow::bail!("invalid trajectory id for file storage: {id:?}");
    }
    Ok(())
}

/// Write `value` as pretty JSON through a temporary file and a rename.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Read an aggregate JSON array, skipping elements that do not parse. A file
/// that is not an array at all is an error.
async fn read_record_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let raw: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))?;

    let mut records = Vec::with_capacity(raw.len());
    for (position, value) in raw.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                position,
                error = %e,
                "skipping unparseable record"
            ),
        }
    }
    Ok(records)
}

impl StorageAdapter for FileStorage {
    async fn initialize(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(self.trajectory_dir())
            .await
            .with_context(|| format!("Failed to create {}", self.trajectory_dir().display()))?;

        let curation: Vec<CurationMetadata> =
            read_record_array(&self.root.join(CURATION_FILE)).await?;
        self.curation = curation
            .into_iter()
            .map(|m| (m.trajectory_id.clone(), m))
            .collect();

        let embeddings: Vec<StoredEmbedding> =
            read_record_array(&self.root.join(EMBEDDINGS_FILE)).await?;
        self.index = EmbeddingIndex::from_records(embeddings);
        self.initialized = true;

        info!(
            root = %self.root.display(),
            curation = self.curation.len(),
            embeddings = self.index.len(),
            "file storage initialised"
        );
        Ok(())
    }

    async fn save_trajectory(&mut self, trajectory: &Trajectory) -> Result<()> {
        let path = self.trajectory_path(&trajectory.id)?;
        write_json(&path, trajectory).await?;
        debug!(id = %trajectory.id, "trajectory written");
        Ok(())
    }

    async fn get_trajectory(&self, id: &str) -> Result<Option<Trajectory>> {
        let path = self.trajectory_path(id)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let trajectory = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(trajectory))
    }

    async fn load_trajectories(&self) -> Result<Vec<Trajectory>> {
        let dir = self.trajectory_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
            }
        };

        let mut trajectories = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(text) => serde_json::from_str::<Trajectory>(&text).map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(trajectory) => trajectories.push(trajectory),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable trajectory file"
                ),
            }
        }
        trajectories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(trajectories)
    }

    async fn delete_trajectory(&mut self, id: &str) -> Result<bool> {
        let path = self.trajectory_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn save_curation(&mut self, meta: &CurationMetadata) -> Result<()> {
        self.ensure_initialized().await?;
        self.curation
            .insert(meta.trajectory_id.clone(), meta.clone());
        self.persist_curation().await
    }

    async fn get_curation(&self, trajectory_id: &str) -> Result<Option<CurationMetadata>> {
        Ok(self.curation.get(trajectory_id).cloned())
    }

    async fn load_curation(&self) -> Result<Vec<CurationMetadata>> {
        Ok(self.curation.values().cloned().collect())
    }

    async fn delete_curation(&mut self, trajectory_id: &str) -> Result<bool> {
        self.ensure_initialized().await?;
        if self.curation.remove(trajectory_id).is_none() {
            return Ok(false);
        }
        self.persist_curation().await?;
        Ok(true)
    }

    async fn save_embeddings(&mut self, embeddings: Vec<StoredEmbedding>) -> Result<()> {
        if embeddings.is_empty() {
            return Ok(());
        }
        self.ensure_initialized().await?;
        for embedding in embeddings {
            self.index.upsert(embedding);
        }
        self.persist_embeddings().await
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
        self.ensure_initialized().await?;
        let removed = self.index.remove_trajectory(trajectory_id);
        if removed > 0 {
            self.persist_embeddings().await?;
        }
        Ok(removed)
    }
}

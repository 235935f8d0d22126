//! Trajectory memory: the data model, the store, retrieval and curation.
//!
//! This module provides:
//! - [`types`] -- [`Trajectory`], [`Step`], [`StepExample`],
//!   [`CurationMetadata`] and the embedding records.
//! - [`store::TrajectoryStore`] -- owner of every trajectory and its
//!   dependants, with similarity search.
//! - [`retriever::Retriever`] -- example retrieval for the decision loop and
//!   per-episode credit assignment.
//! - [`curation::CurationManager`] -- periodic pruning of low-utility
//!   trajectories.

pub mod curation;
pub mod retriever;
pub mod store;
pub mod types;

pub use curation::CurationManager;
pub use retriever::Retriever;
pub use store::TrajectoryStore;
pub use types::{
    CurationMetadata, EmbeddingKind, SearchHit, Step, StepExample, StoredEmbedding, Trajectory,
};

//! Agent module: the ReAct decision loop and the agent facade over it.
//!
//! The [`DecisionLoop`] runs one episode, pulling in-context examples from a
//! [`crate::trajectory::Retriever`]. The [`Agent`] adds storage of successful
//! episodes and periodic curation on top.

pub mod agent;
pub mod react;

// Re-export the primary types for convenient access.
pub use agent::{Agent, TrainOutcome, Verifier, VerifyFuture};
pub use react::{DecisionLoop, StepCallback};

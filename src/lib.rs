//! Tracebank: trajectory memory for LLM agents.
//!
//! Successful episodes are stored as trajectories, retrieved as in-context
//! examples for later episodes, credited with the outcome of every episode
//! they influence, and pruned once they stop helping.

pub mod agent;
pub mod config;
pub mod env;
pub mod model;
pub mod storage;
pub mod trajectory;

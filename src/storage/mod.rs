//! Storage backends for the trajectory memory.
//!
//! - [`traits::StorageAdapter`] -- the contract the store is written against.
//! - [`index::EmbeddingIndex`] -- brute-force cosine ranking shared by the
//!   backends.
//! - [`memory::MemoryStorage`] -- volatile backend.
//! - [`file::FileStorage`] -- JSON files under a root directory.

pub mod file;
pub mod index;
pub mod memory;
pub mod traits;

pub use file::FileStorage;
pub use index::{cosine_similarity, EmbeddingIndex};
pub use memory::MemoryStorage;
pub use traits::StorageAdapter;

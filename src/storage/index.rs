//! Brute-force cosine-similarity index over stored embeddings.
//!
//! Vectors are L2-normalised once on insertion so a query costs one dot
//! product per entry. A zero vector stays unnormalised and therefore scores
//! 0 against everything. Ties keep insertion order.

use ordered_float::OrderedFloat;

use crate::trajectory::types::{EmbeddingKind, SearchHit, StoredEmbedding};

#[derive(Debug, Clone)]
struct IndexEntry {
    record: StoredEmbedding,
    unit: Vec<f32>,
}

/// In-memory embedding index shared by every storage adapter.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    entries: Vec<IndexEntry>,
}

/// Return `v / |v|`, or `v` unchanged when it has zero length.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    dot(&normalize(a), &normalize(b))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from persisted records, in order.
    pub fn from_records(records: impl IntoIterator<Item = StoredEmbedding>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.upsert(record);
        }
        index
    }

    /// Insert a record, replacing any existing record with the same id in
    /// place.
    pub fn upsert(&mut self, record: StoredEmbedding) {
        let entry = IndexEntry {
            unit: normalize(&record.embedding),
            record,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.record.id == entry.record.id)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove every record owned by `trajectory_id`; returns how many went.
    pub fn remove_trajectory(&mut self, trajectory_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.record.trajectory_id != trajectory_id);
        before - self.entries.len()
    }

    /// Top-`k` records of `kind` by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], kind: EmbeddingKind, k: usize) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let query = normalize(query);

        let mut scored: Vec<(OrderedFloat<f32>, &StoredEmbedding)> = self
            .entries
            .iter()
            .filter(|e| e.record.kind == kind)
            .map(|e| (OrderedFloat(dot(&query, &e.unit)), &e.record))
            .collect();

        // `sort_by` is stable, so equal scores keep storage order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .take(k)
            .map(|(score, record)| SearchHit {
                id: record.id.clone(),
                trajectory_id: record.trajectory_id.clone(),
                step_index: record.step_index,
                score: score.into_inner(),
            })
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &StoredEmbedding> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn records_for<'a>(
        &'a self,
        trajectory_id: &'a str,
    ) -> impl Iterator<Item = &'a StoredEmbedding> + 'a {
        self.records()
            .filter(move |r| r.trajectory_id == trajectory_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_search_ranks_and_filters_by_kind() {
        let index = EmbeddingIndex::from_records([
            StoredEmbedding::for_trajectory("far", vec![0.0, 1.0]),
            StoredEmbedding::for_trajectory("near", vec![0.9, 0.1]),
            StoredEmbedding::for_step("near", 0, vec![1.0, 0.0]),
        ]);

        let hits = index.search(&[1.0, 0.0], EmbeddingKind::Trajectory, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].trajectory_id, "near");
        assert_eq!(hits[1].trajectory_id, "far");
        assert!(hits[0].score > hits[1].score);

        let steps = index.search(&[1.0, 0.0], EmbeddingKind::Step, 5);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_index, Some(0));
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let index = EmbeddingIndex::from_records([
            StoredEmbedding::for_trajectory("first", vec![2.0, 0.0]),
            StoredEmbedding::for_trajectory("second", vec![1.0, 0.0]),
            StoredEmbedding::for_trajectory("third", vec![3.0, 0.0]),
        ]);
        let hits = index.search(&[1.0, 0.0], EmbeddingKind::Trajectory, 2);
        assert_eq!(hits[0].trajectory_id, "first");
        assert_eq!(hits[1].trajectory_id, "second");
    }

    #[test]
    fn test_upsert_replaces_in_place_and_remove() {
        let mut index = EmbeddingIndex::new();
        index.upsert(StoredEmbedding::for_trajectory("a", vec![1.0]));
        index.upsert(StoredEmbedding::for_step("a", 0, vec![1.0]));
        index.upsert(StoredEmbedding::for_trajectory("b", vec![1.0]));
        index.upsert(StoredEmbedding::for_trajectory("a", vec![2.0]));
        assert_eq!(index.len(), 3);
        assert_eq!(index.records().next().unwrap().embedding, vec![2.0]);

        assert_eq!(index.remove_trajectory("a"), 2);
        assert_eq!(index.records_for("a").count(), 0);
        assert_eq!(index.remove_trajectory("a"), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_search_zero_k() {
        let index = EmbeddingIndex::from_records([StoredEmbedding::for_trajectory("a", vec![1.0])]);
        assert!(index.search(&[1.0], EmbeddingKind::Trajectory, 0).is_empty());
    }
}

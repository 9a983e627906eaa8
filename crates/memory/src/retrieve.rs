//! Threshold-then-rank retrieval of stored memories.
//!
//! Filtering happens before ranking so the result can never contain an entry
//! below the relevance threshold, even when fewer than `top_k` qualify.

use std::{cmp::Ordering, sync::Arc};

use crate::{
    similarity::SimilarityEngine,
    store::{MemoryEntry, MemoryStore},
};

/// A stored memory with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f32,
}

pub struct MemoryRetriever {
    store: Arc<dyn MemoryStore>,
    similarity: SimilarityEngine,
}

impl MemoryRetriever {
    pub fn new(store: Arc<dyn MemoryStore>, similarity: SimilarityEngine) -> Self {
        Self { store, similarity }
    }

    /// Best-scoring memories for `query`, best first, at most `top_k`.
    /// Equal scores keep store order, so results are deterministic.
    /// An empty store or an empty result set is a valid state, not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<ScoredMemory>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.store.list().await?;
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = snapshot.iter().map(|e| e.text.clone()).collect();
        let scores = self.similarity.score_one(query, &texts).await?;

        let mut hits: Vec<(usize, ScoredMemory)> = snapshot
            .into_iter()
            .zip(scores)
            .enumerate()
            .filter(|(_, (_, score))| *score >= threshold)
            .map(|(position, (entry, score))| (position, ScoredMemory { entry, score }))
            .collect();

        hits.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(top_k);

        Ok(hits.into_iter().map(|(_, scored)| scored).collect())
    }
}

//! Similarity-based merge of a new fact into the store.
//!
//! A new fact either replaces its nearest stored neighbour (when similarity
//! reaches the merge threshold) or is appended. Scoring happens outside any
//! store lock — the embedding round-trip must not serialize other turns — so
//! the eventual replace re-validates against the snapshot via the entry's
//! `(id, revision)` pair.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    similarity::SimilarityEngine,
    store::{MemoryStore, ReplaceOutcome},
};

/// How a fact entered the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Stored as a new entry with this id.
    Appended(u64),
    /// Overwrote the existing entry with this id.
    Replaced(u64),
}

pub struct MemoryMerger {
    store: Arc<dyn MemoryStore>,
    similarity: SimilarityEngine,
}

impl MemoryMerger {
    pub fn new(store: Arc<dyn MemoryStore>, similarity: SimilarityEngine) -> Self {
        Self { store, similarity }
    }

    /// Merge one fact. Ties in the arg-max resolve to the lowest index, so
    /// the outcome is deterministic for a given snapshot.
    pub async fn merge_one(&self, fact: &str, threshold: f32) -> anyhow::Result<MergeOutcome> {
        let fact = fact.trim();
        anyhow::ensure!(!fact.is_empty(), "cannot merge an empty memory fact");

        let snapshot = self.store.list().await?;
        if snapshot.is_empty() {
            return self.append(fact).await;
        }

        let texts: Vec<String> = snapshot.iter().map(|e| e.text.clone()).collect();
        let scores = self.similarity.score_one(fact, &texts).await?;

        let Some((best_idx, best_score)) = stable_argmax(&scores) else {
            return self.append(fact).await;
        };
        if best_score < threshold {
            debug!(best_score, threshold, "no near-duplicate, appending");
            return self.append(fact).await;
        }

        let target = &snapshot[best_idx];
        match self
            .store
            .replace(target.id, target.revision, fact)
            .await?
        {
            ReplaceOutcome::Replaced(entry) => {
                debug!(id = entry.id, score = best_score, "replaced near-duplicate memory");
                Ok(MergeOutcome::Replaced(entry.id))
            },
            ReplaceOutcome::StaleRevision | ReplaceOutcome::UnknownId => {
                // A concurrent turn rewrote or removed the target after our
                // snapshot. Appending loses nothing and can never clobber
                // the wrong entry.
                warn!(id = target.id, "merge target changed under us, appending instead");
                self.append(fact).await
            },
        }
    }

    async fn append(&self, fact: &str) -> anyhow::Result<MergeOutcome> {
        let created = self.store.append(&[fact.to_string()]).await?;
        let entry = created
            .last()
            .ok_or_else(|| anyhow::anyhow!("store dropped a non-empty fact"))?;
        Ok(MergeOutcome::Appended(entry.id))
    }
}

/// Index and value of the maximum score; first occurrence wins ties.
fn stable_argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {},
            _ => best = Some((i, score)),
        }
    }
    best
}

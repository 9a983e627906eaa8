//! Similarity engine: inner products of provider-normalized embeddings.
//!
//! Corpus embeddings are recomputed on every call. That is a deliberate
//! simplification — at the scale of one user's memory file a brute-force
//! scan is cheaper than keeping a cache coherent. Known scaling limit.

use std::sync::Arc;

use crate::embeddings::EmbeddingProvider;

#[derive(Clone)]
pub struct SimilarityEngine {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SimilarityEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Score every query against every candidate. The result has one row per
    /// query and one column per candidate; with no candidates each row is
    /// empty ("no matches", not an error). A single embedding round-trip
    /// covers all texts.
    pub async fn score_matrix(
        &self,
        queries: &[String],
        candidates: &[String],
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        if candidates.is_empty() {
            return Ok(vec![Vec::new(); queries.len()]);
        }

        let mut texts = Vec::with_capacity(queries.len() + candidates.len());
        texts.extend_from_slice(queries);
        texts.extend_from_slice(candidates);

        let embeddings = self.embedder.embed_batch(&texts).await?;
        anyhow::ensure!(
            embeddings.len() == texts.len(),
            "embedder returned {} vectors for {} texts",
            embeddings.len(),
            texts.len()
        );

        let (query_embs, candidate_embs) = embeddings.split_at(queries.len());
        Ok(query_embs
            .iter()
            .map(|q| candidate_embs.iter().map(|c| dot(q, c)).collect())
            .collect())
    }

    /// Single-query convenience: one score per candidate.
    pub async fn score_one(&self, query: &str, candidates: &[String]) -> anyhow::Result<Vec<f32>> {
        let mut matrix = self
            .score_matrix(&[query.to_string()], candidates)
            .await?;
        Ok(matrix.pop().unwrap_or_default())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::llm::LlmProvider;

/// One indexed text and its embedding
#[derive(Debug, Clone)]
struct VectorIndexEntry {
    embedding: Vec<f32>,
    text: String,
}

/// Exact nearest-neighbor search over embedded texts.
///
/// Rows of `normalized` are the unit-length embeddings of `entries`, in the
/// same order. The matrix is rebuilt from scratch on every insert.
pub struct SemanticIndex {
    embedder: Arc<dyn LlmProvider>,
    entries: Vec<VectorIndexEntry>,
    normalized: Vec<Vec<f32>>,
    dimension: Option<usize>,
}

impl SemanticIndex {
    pub fn new(embedder: Arc<dyn LlmProvider>) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
            normalized: Vec::new(),
            dimension: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embed `text` and append it to the index.
    pub async fn add(&mut self, text: &str) -> Result<()> {
        let embedding = self.embedder.embed(text).await.context("Failed to embed indexed text")?;
        if embedding.is_empty() {
            anyhow::bail!("embedding service returned an empty vector");
        }

        match self.dimension {
            Some(dim) if dim != embedding.len() => {
                anyhow::bail!("embedding dimension mismatch: index has {}, got {}", dim, embedding.len());
            }
            Some(_) => {}
            None => self.dimension = Some(embedding.len()),
        }

        self.entries.push(VectorIndexEntry {
            embedding,
            text: text.to_string(),
        });
        self.rebuild();
        debug!("index: {} entries", self.entries.len());
        Ok(())
    }

    fn rebuild(&mut self) {
        self.normalized = self.entries.iter().map(|e| normalize(&e.embedding)).collect();
    }

    /// The `k` texts nearest to `query`, closest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_with_distances(query, k)
            .await?
            .into_iter()
            .map(|(text, _)| text)
            .collect())
    }

    /// Like [`search`](Self::search), with the cosine distance of each hit.
    pub async fn search_with_distances(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await.context("Failed to embed search query")?;
        if Some(embedding.len()) != self.dimension {
            anyhow::bail!(
                "query embedding has dimension {}, index expects {}",
                embedding.len(),
                self.dimension.unwrap_or_default()
            );
        }
        let query = normalize(&embedding);

        let mut scored: Vec<(usize, f32)> = self
            .normalized
            .iter()
            .enumerate()
            .map(|(i, row)| (i, 1.0 - dot(row, &query)))
            .collect();
        // Stable: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(self.entries.len()));

        Ok(scored
            .into_iter()
            .map(|(i, distance)| (self.entries[i].text.clone(), distance))
            .collect())
    }
}

/// Unit-length copy of `v`; the zero vector stays zero.
fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EntityMention, LlmRequest, LlmResponse};
    use crate::models::Sentiment;
    use crate::testing::MockLlm;

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = SemanticIndex::new(Arc::new(MockLlm::new()));
        assert!(index.search("anything", 3).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn k_is_clamped_and_distances_ascend() {
        let mut index = SemanticIndex::new(Arc::new(MockLlm::new()));
        for text in [
            "solar panels and wind turbines",
            "central bank interest rates",
            "solar farms expand",
        ] {
            index.add(text).await.expect("add");
        }
        assert_eq!(index.len(), 3);

        let hits = index.search_with_distances("wind turbines", 10).await.expect("search");
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(hits[0].0, "solar panels and wind turbines");
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let mut index = SemanticIndex::new(Arc::new(MockLlm::new()));
        index.add("alpha beta").await.expect("add");
        index.add("beta alpha").await.expect("add");
        let hits = index.search("alpha beta", 2).await.expect("search");
        assert_eq!(hits, vec!["alpha beta", "beta alpha"]);
    }

    struct VaryingDimension(std::sync::Mutex<usize>);

    #[async_trait::async_trait]
    impl LlmProvider for VaryingDimension {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse> {
            unimplemented!()
        }
        async fn summarize(&self, _c: &str, _max: usize, _min: usize) -> Result<String> {
            unimplemented!()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let mut dim = self.0.lock().unwrap();
            *dim += 1;
            Ok(vec![1.0; *dim])
        }
        async fn extract_entities(&self, _text: &str) -> Result<Vec<EntityMention>> {
            unimplemented!()
        }
        async fn analyze_sentiment(&self, _text: &str) -> Result<Sentiment> {
            unimplemented!()
        }
        async fn noun_phrases(&self, _text: &str) -> Result<Vec<String>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let mut index = SemanticIndex::new(Arc::new(VaryingDimension(std::sync::Mutex::new(1))));
        index.add("first").await.expect("add");
        assert!(index.add("second").await.is_err());
        assert_eq!(index.len(), 1);
    }
}

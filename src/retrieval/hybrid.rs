//! Hybrid retrieval: weighted fusion of lexical and vector search.
//!
//! Both source lists are min-max normalized independently before fusion, so
//! raw BM25 magnitudes never mix with raw distances. The fused list then
//! passes through the shared per-document cap and Jaccard deduplication.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::paths::CaseId;
use crate::retrieval::lexical::LexicalIndex;
use crate::retrieval::{apply_doc_cap, dedupe_results, normalize_scores};
use crate::store::VectorBackend;
use crate::types::{CoreError, SearchResult};

/// Per-call knobs; anything unset falls back to the retriever's defaults.
#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub lexical_weight: f32,
    pub vector_weight: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            lexical_weight: 0.5,
            vector_weight: 0.5,
        }
    }
}

pub struct HybridRetriever {
    lexical: Arc<LexicalIndex>,
    vectors: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
    max_per_doc: usize,
    dedupe_threshold: f32,
}

impl HybridRetriever {
    pub fn new(
        lexical: Arc<LexicalIndex>,
        vectors: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        default_top_k: usize,
        max_per_doc: usize,
        dedupe_threshold: f32,
    ) -> Self {
        Self {
            lexical,
            vectors,
            embedder,
            default_top_k,
            max_per_doc,
            dedupe_threshold,
        }
    }

    /// Fused search. Returns up to `top_k` results with scores in [0, 1],
    /// descending, capped per document and deduplicated.
    pub async fn search(
        &self,
        case: &CaseId,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let top_k = options.top_k.unwrap_or(self.default_top_k);
        let fetch_k = top_k * 3;

        let lexical_hits = self.lexical_results(case, query, fetch_k).await?;
        let vector_hits = self.vector_results(case, query, fetch_k).await?;
        debug!(case = %case, lexical = lexical_hits.len(), vector = vector_hits.len(),
            "fusing retrieval results");

        // Union by chunk id, preserving first-seen order; a chunk missing
        // from one list contributes 0 on that side.
        let mut order: Vec<SearchResult> = Vec::new();
        let mut sides: HashMap<String, (f32, f32)> = HashMap::new();

        for hit in lexical_hits {
            let entry = sides.entry(hit.chunk_id.clone()).or_insert_with(|| {
                order.push(hit.clone());
                (0.0, 0.0)
            });
            entry.0 = hit.score;
        }
        for hit in vector_hits {
            let entry = sides.entry(hit.chunk_id.clone()).or_insert_with(|| {
                order.push(hit.clone());
                (0.0, 0.0)
            });
            entry.1 = hit.score;
        }

        let mut fused = order;
        for result in fused.iter_mut() {
            let (lexical_score, vector_score) = sides[&result.chunk_id];
            result.score =
                options.lexical_weight * lexical_score + options.vector_weight * vector_score;
        }

        // Stable: equal fused scores keep union insertion order.
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let fused = apply_doc_cap(fused, self.max_per_doc);
        let mut fused = dedupe_results(fused, self.dedupe_threshold);
        fused.truncate(top_k);
        Ok(fused)
    }

    /// Lexical-only mode, useful for names, dates and identifiers. Scores
    /// are raw BM25 values.
    pub async fn search_keyword_only(
        &self,
        case: &CaseId,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let hits = self.raw_lexical(case, query, top_k * 2).await?;
        let mut results = dedupe_results(hits, self.dedupe_threshold);
        results.truncate(top_k);
        Ok(results)
    }

    /// Vector-only mode, useful for narrative questions. Scores are
    /// `1/(1+distance)` similarities.
    pub async fn search_vector_only(
        &self,
        case: &CaseId,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let hits = self.raw_vector(case, query, top_k * 2).await?;
        let capped = apply_doc_cap(hits, self.max_per_doc);
        let mut results = dedupe_results(capped, self.dedupe_threshold);
        results.truncate(top_k);
        Ok(results)
    }

    async fn raw_lexical(
        &self,
        case: &CaseId,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<SearchResult>, CoreError> {
        Ok(self
            .lexical
            .query(case, query, fetch_k)
            .await?
            .into_iter()
            .map(|(chunk, score)| SearchResult::from_chunk(chunk, score as f32))
            .collect())
    }

    async fn raw_vector(
        &self,
        case: &CaseId,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let embedding = self.embedder.embed_one(query).await?;
        Ok(self
            .vectors
            .query(case, &embedding, fetch_k)
            .await?
            .into_iter()
            .map(|(chunk, distance)| {
                SearchResult::from_chunk(chunk, 1.0 / (1.0 + distance))
            })
            .collect())
    }

    async fn lexical_results(
        &self,
        case: &CaseId,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let mut results = self.raw_lexical(case, query, fetch_k).await?;
        let mut scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        normalize_scores(&mut scores);
        for (result, score) in results.iter_mut().zip(scores) {
            result.score = score;
        }
        Ok(results)
    }

    async fn vector_results(
        &self,
        case: &CaseId,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<SearchResult>, CoreError> {
        let mut results = self.raw_vector(case, query, fetch_k).await?;
        let mut scores: Vec<f32> = results.iter().map(|r| r.score).collect();
        normalize_scores(&mut scores);
        for (result, score) in results.iter_mut().zip(scores) {
            result.score = score;
        }
        Ok(results)
    }
}

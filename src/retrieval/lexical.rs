//! Per-case in-memory BM25 index.
//!
//! Built lazily from the document index on first query, dropped on
//! [`LexicalIndex::invalidate`], never persisted. Two concurrent queries on
//! a stale view are acceptable; both see a consistent snapshot and the next
//! query after invalidation rebuilds.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::paths::CaseId;
use crate::retrieval::tokenize;
use crate::store::DocumentIndex;
use crate::types::{CoreError, EvidenceChunk};

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

/// Immutable BM25 snapshot of one case.
struct CaseSnapshot {
    chunks: Vec<EvidenceChunk>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl CaseSnapshot {
    fn build(chunks: Vec<EvidenceChunk>) -> Self {
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for chunk in &chunks {
            let tokens = tokenize(&chunk.text);
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
        };

        Self {
            chunks,
            term_freqs,
            doc_lens,
            doc_freq,
            avg_doc_len,
        }
    }

    /// Okapi BM25 score of every chunk against the query terms.
    fn scores(&self, terms: &[String]) -> Vec<f64> {
        let n = self.chunks.len() as f64;
        let mut scores = vec![0.0; self.chunks.len()];

        for term in terms {
            let Some(&df) = self.doc_freq.get(term) else {
                continue;
            };
            let idf = (((n - df as f64 + 0.5) / (df as f64 + 0.5)) + 1.0).ln();

            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f64;
                let len_norm = if self.avg_doc_len > 0.0 {
                    1.0 - BM25_B + BM25_B * self.doc_lens[i] as f64 / self.avg_doc_len
                } else {
                    1.0
                };
                scores[i] += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
            }
        }

        scores
    }
}

/// Lazily built BM25 index over every chunk of a case.
pub struct LexicalIndex {
    documents: Arc<DocumentIndex>,
    snapshots: RwLock<HashMap<String, Arc<CaseSnapshot>>>,
    max_per_doc: usize,
}

impl LexicalIndex {
    pub fn new(documents: Arc<DocumentIndex>, max_per_doc: usize) -> Self {
        Self {
            documents,
            snapshots: RwLock::new(HashMap::new()),
            max_per_doc,
        }
    }

    /// Drops the cached index for a case; the next query rebuilds it from
    /// the chunk store. Call after any upload or deletion.
    pub fn invalidate(&self, case: &CaseId) {
        if self.snapshots.write().remove(case.as_str()).is_some() {
            debug!(case = %case, "lexical index invalidated");
        }
    }

    /// BM25 query: zero-score hits filtered, descending score order, at most
    /// `max_per_doc` hits per file, truncated to `top_k`.
    pub async fn query(
        &self,
        case: &CaseId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(EvidenceChunk, f64)>, CoreError> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot(case).await?;
        if snapshot.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let scores = snapshot.scores(&terms);
        let mut scored: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // Stable sort keeps insertion order for tied scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut per_doc: HashMap<&str, usize> = HashMap::new();
        let mut results = Vec::new();
        for (index, score) in scored {
            let chunk = &snapshot.chunks[index];
            let seen = per_doc
                .entry(chunk.provenance.file_name.as_str())
                .or_insert(0);
            if *seen >= self.max_per_doc {
                continue;
            }
            *seen += 1;
            results.push((chunk.clone(), score));
            if results.len() >= top_k {
                break;
            }
        }

        Ok(results)
    }

    async fn snapshot(&self, case: &CaseId) -> Result<Arc<CaseSnapshot>, CoreError> {
        if let Some(snapshot) = self.snapshots.read().get(case.as_str()) {
            return Ok(snapshot.clone());
        }

        let chunk_ids = self.documents.all_chunk_ids(case).await?;
        let chunks = self.documents.chunks_by_ids(case, &chunk_ids).await?;
        debug!(case = %case, chunks = chunks.len(), "building lexical index");

        let snapshot = Arc::new(CaseSnapshot::build(chunks));
        self.snapshots
            .write()
            .insert(case.as_str().to_string(), snapshot.clone());
        Ok(snapshot)
    }
}

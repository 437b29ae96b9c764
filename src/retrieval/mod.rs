//! Evidence retrieval: a per-case lexical index, a vector query path, and
//! the fusion layer that merges them.
//!
//! The post-processing every search mode shares lives here: per-document
//! caps, token-set Jaccard deduplication, and min-max score normalization.

pub mod hybrid;
pub mod lexical;

use std::collections::{HashMap, HashSet};

use crate::types::SearchResult;

pub use hybrid::{HybridRetriever, SearchOptions};
pub use lexical::LexicalIndex;

/// Lowercases and splits on non-alphanumeric boundaries. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Keeps at most `max_per_doc` results per file name, preserving order.
pub(crate) fn apply_doc_cap(results: Vec<SearchResult>, max_per_doc: usize) -> Vec<SearchResult> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(results.len());

    for result in results {
        let seen = counts
            .entry(result.provenance.file_name.clone())
            .or_insert(0);
        if *seen < max_per_doc {
            *seen += 1;
            kept.push(result);
        }
    }

    kept
}

/// Walks the ordered results and drops any whose token-set Jaccard
/// similarity with an already-kept result reaches the threshold. Every pair
/// is compared; shorter chunks get no shortcut.
pub(crate) fn dedupe_results(results: Vec<SearchResult>, threshold: f32) -> Vec<SearchResult> {
    if results.len() <= 1 {
        return results;
    }

    let mut kept: Vec<(SearchResult, HashSet<String>)> = Vec::with_capacity(results.len());

    for result in results {
        let tokens: HashSet<String> = tokenize(&result.text).into_iter().collect();
        let duplicate = kept.iter().any(|(_, existing)| {
            jaccard(&tokens, existing) >= threshold
        });
        if !duplicate {
            kept.push((result, tokens));
        }
    }

    kept.into_iter().map(|(result, _)| result).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Min-max normalizes scores into [0, 1] in place. When every score is
/// equal the list collapses to 1.0 (or 0.0 if the shared score is not
/// positive).
pub(crate) fn normalize_scores(scores: &mut [f32]) {
    let Some(&first) = scores.first() else {
        return;
    };
    let (min, max) = scores.iter().fold((first, first), |(lo, hi), &s| {
        (lo.min(s), hi.max(s))
    });
    let range = max - min;

    if range == 0.0 {
        let collapsed = if max > 0.0 { 1.0 } else { 0.0 };
        for score in scores.iter_mut() {
            *score = collapsed;
        }
        return;
    }

    for score in scores.iter_mut() {
        *score = (*score - min) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkProvenance, SourceKind};

    fn result(id: &str, file: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: id.to_string(),
            text: text.to_string(),
            score,
            provenance: ChunkProvenance {
                chunk_id: id.to_string(),
                file_name: file.to_string(),
                page_num: Some(1),
                para_idx: None,
                char_start: 0,
                char_end: text.len(),
                ocr: false,
            },
            source: SourceKind::Client,
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("The client's notice-period: 4 weeks!"),
            vec!["the", "client", "s", "notice", "period", "4", "weeks"]
        );
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn doc_cap_limits_per_file() {
        let results = vec![
            result("a", "one.pdf", "t1", 0.9),
            result("b", "one.pdf", "t2", 0.8),
            result("c", "one.pdf", "t3", 0.7),
            result("d", "one.pdf", "t4", 0.6),
            result("e", "two.pdf", "t5", 0.5),
        ];
        let capped = apply_doc_cap(results, 3);
        assert_eq!(capped.len(), 4);
        assert!(capped.iter().all(|r| r.chunk_id != "d"));
    }

    #[test]
    fn dedupe_drops_near_identical_text() {
        let results = vec![
            result("a", "one.pdf", "the quick brown fox jumps over the lazy dog", 0.9),
            result("b", "two.pdf", "the quick  brown fox jumps over the lazy dog", 0.8),
            result("c", "three.pdf", "completely different subject matter here", 0.7),
        ];
        let deduped = dedupe_results(results, 0.9);
        let ids: Vec<_> = deduped.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn normalize_handles_uniform_scores() {
        let mut scores = vec![3.0, 3.0, 3.0];
        normalize_scores(&mut scores);
        assert_eq!(scores, vec![1.0, 1.0, 1.0]);

        let mut zeros = vec![0.0, 0.0];
        normalize_scores(&mut zeros);
        assert_eq!(zeros, vec![0.0, 0.0]);

        let mut spread = vec![1.0, 2.0, 3.0];
        normalize_scores(&mut spread);
        assert_eq!(spread, vec![0.0, 0.5, 1.0]);
    }
}

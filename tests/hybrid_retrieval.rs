//! Hybrid retriever bounds: per-document caps, deduplication, score ranges.

mod common;

use citesmith::types::{ChunkProvenance, EvidenceChunk};
use citesmith::{CaseId, EmbeddingProvider, MockEmbeddingProvider, SearchOptions, VectorBackend};
use common::harness;

fn chunk(id: &str, file: &str, page: u32, text: &str) -> EvidenceChunk {
    EvidenceChunk {
        text: text.to_string(),
        provenance: ChunkProvenance {
            chunk_id: id.to_string(),
            file_name: file.to_string(),
            page_num: Some(page),
            para_idx: None,
            char_start: 0,
            char_end: text.len(),
            ocr: false,
        },
    }
}

/// Seeds chunks through both stores the way ingestion would.
async fn seed(h: &common::TestHarness, case: &CaseId, file: &str, chunks: Vec<EvidenceChunk>) {
    let embedder = MockEmbeddingProvider::new(16);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await.unwrap();

    h.vectors
        .add_chunks(case, chunks.iter().cloned().zip(embeddings).collect())
        .await
        .unwrap();
    h.assistant
        .documents()
        .index_document(case, file, &chunks)
        .await
        .unwrap();
}

#[tokio::test]
async fn per_document_cap_bounds_one_files_contribution() {
    let h = harness(vec!["unused"], vec!["gov.uk".into()], None);
    let case = CaseId::new("cap").unwrap();
    h.assistant.create_case(&case).await.unwrap();

    // Twenty chunks from one file, every one a strong match for the query.
    let chunks: Vec<EvidenceChunk> = (0..20)
        .map(|i| {
            chunk(
                &format!("cap{i:05}"),
                "bundle.pdf",
                i + 1,
                &format!("redundancy payment calculation section {i} of the bundle"),
            )
        })
        .collect();
    seed(&h, &case, "bundle.pdf", chunks).await;

    let results = h
        .assistant
        .search(&case, "redundancy payment calculation", SearchOptions::default())
        .await
        .unwrap();

    let from_bundle = results
        .iter()
        .filter(|r| r.provenance.file_name == "bundle.pdf")
        .count();
    assert!(from_bundle <= 3, "cap exceeded: {from_bundle}");
    assert!(!results.is_empty());
}

#[tokio::test]
async fn near_duplicates_are_dropped() {
    let h = harness(vec!["unused"], vec!["gov.uk".into()], None);
    let case = CaseId::new("dupes").unwrap();
    h.assistant.create_case(&case).await.unwrap();

    // Token sets differ only by whitespace and one filler word.
    seed(
        &h,
        &case,
        "a.pdf",
        vec![chunk(
            "dupaaaa1",
            "a.pdf",
            1,
            "the dismissal letter was sent on the first of june without any prior warning",
        )],
    )
    .await;
    seed(
        &h,
        &case,
        "b.pdf",
        vec![chunk(
            "dupbbbb2",
            "b.pdf",
            1,
            "the dismissal letter was  sent on the first of june without prior warning",
        )],
    )
    .await;
    seed(
        &h,
        &case,
        "c.pdf",
        vec![chunk(
            "dupcccc3",
            "c.pdf",
            1,
            "holiday pay accrues during the notice period at the usual rate",
        )],
    )
    .await;

    let results = h
        .assistant
        .search(&case, "dismissal letter june", SearchOptions::default())
        .await
        .unwrap();

    let dup_hits = results
        .iter()
        .filter(|r| r.chunk_id.starts_with("dup") && r.text.contains("dismissal"))
        .count();
    assert_eq!(dup_hits, 1, "near-duplicate survived dedupe");
}

#[tokio::test]
async fn fused_scores_stay_in_unit_interval() {
    let h = harness(vec!["unused"], vec!["gov.uk".into()], None);
    let case = CaseId::new("scores").unwrap();
    h.assistant.create_case(&case).await.unwrap();

    let chunks: Vec<EvidenceChunk> = (0..6)
        .map(|i| {
            chunk(
                &format!("sc{i:06}"),
                &format!("doc{i}.pdf"),
                1,
                &format!("grievance meeting notes entry {i} about the manager"),
            )
        })
        .collect();
    for (i, c) in chunks.into_iter().enumerate() {
        seed(&h, &case, &format!("doc{i}.pdf"), vec![c]).await;
    }

    let results = h
        .assistant
        .search(&case, "grievance meeting notes", SearchOptions::default())
        .await
        .unwrap();

    assert!(!results.is_empty());
    for result in &results {
        assert!(
            (0.0..=1.0).contains(&result.score),
            "score {} out of range",
            result.score
        );
    }
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results not descending");
    }
}

#[tokio::test]
async fn empty_case_and_empty_query_return_no_results() {
    let h = harness(vec!["unused"], vec!["gov.uk".into()], None);
    let case = CaseId::new("empty").unwrap();
    h.assistant.create_case(&case).await.unwrap();

    let results = h
        .assistant
        .search(&case, "anything at all", SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let results = h
        .assistant
        .search(&case, "", SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

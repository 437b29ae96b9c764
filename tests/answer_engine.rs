//! End-to-end answering: grounded success, fabrication rejection with
//! stricter retry, and retry exhaustion.

mod common;

use httpmock::prelude::*;

use citesmith::legal::SearchSite;
use citesmith::CaseId;
use common::harness;

const STATEMENT: &str =
    "Background of the matter.\n\nThe client started employment on 15 March 2023.\n\nA grievance was raised later that year.";

async fn upload_statement(h: &common::TestHarness, case: &CaseId) {
    let path = h.storage.path().join("statement.txt");
    tokio::fs::write(&path, STATEMENT).await.unwrap();
    h.assistant.upload(case, &path).await.unwrap();
}

#[tokio::test]
async fn grounded_client_answer_validates_first_try() {
    let h = harness(
        vec![
            r#"The client started on 15 March 2023. [Source: statement.txt] "The client started employment on 15 March 2023.""#,
        ],
        vec!["gov.uk".into()],
        None,
    );
    let case = CaseId::new("grounded").unwrap();
    h.assistant.create_case(&case).await.unwrap();
    upload_statement(&h, &case).await;

    let outcome = h
        .assistant
        .ask(&case, "When did the client start employment?")
        .await
        .unwrap();

    assert!(outcome.citations_valid);
    assert!(outcome.validation_errors.is_empty());
    assert!(outcome.answer.contains("15 March 2023"));
    assert_eq!(outcome.citations.len(), 1);
    assert_eq!(
        outcome.citations[0].file_name.as_deref(),
        Some("statement.txt")
    );
    assert_eq!(h.chat.calls(), 1);

    // A successful turn persists session state.
    let session = h
        .storage
        .path()
        .join("cases")
        .join("grounded")
        .join("session.json");
    assert!(session.is_file());
}

#[tokio::test]
async fn fabricated_legal_excerpt_fails_then_stricter_retry_succeeds() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search");
            then.status(200).body(
                r#"<html><body><div class="hit"><a href="/notice-periods">Notice</a></div></body></html>"#,
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/notice-periods");
            then.status(200).body(
                "<html><head><title>Notice</title></head><body><main>\
                 Statutory notice is one week per year of service.\
                 </main></body></html>",
            );
        })
        .await;

    let page_url = server.url("/notice-periods");
    let fabricated = format!(r#"[Source: {page_url}] "Notice is two weeks per year.""#);
    let corrected =
        format!(r#"[Source: {page_url}] "Statutory notice is one week per year of service.""#);

    let h = harness(
        vec![fabricated.as_str(), corrected.as_str()],
        vec!["127.0.0.1".into()],
        Some(vec![SearchSite::new(
            "Mock site",
            server.url("/search"),
            "q",
            ".hit a",
            3,
        )]),
    );
    let case = CaseId::new("fabricated").unwrap();
    h.assistant.create_case(&case).await.unwrap();
    upload_statement(&h, &case).await;

    let outcome = h
        .assistant
        .ask(&case, "What does the law say about notice periods?")
        .await
        .unwrap();

    assert_eq!(h.chat.calls(), 2, "expected one stricter retry");
    assert!(outcome.citations_valid);
    assert_eq!(outcome.legal_sources.len(), 1);
    assert_eq!(outcome.citations.len(), 1);
    assert_eq!(outcome.citations[0].url.as_deref(), Some(page_url.as_str()));
}

#[tokio::test]
async fn exhausted_retries_return_flagged_answer_with_errors() {
    // The scripted model fabricates every time.
    let h = harness(
        vec![r#"[Source: statement.txt] "The client resigned in 2020.""#],
        vec!["gov.uk".into()],
        None,
    );
    let case = CaseId::new("exhausted").unwrap();
    h.assistant.create_case(&case).await.unwrap();
    upload_statement(&h, &case).await;

    let outcome = h
        .assistant
        .ask(&case, "When did the client start employment?")
        .await
        .unwrap();

    // max_citation_retries = 2 -> 3 attempts total.
    assert_eq!(h.chat.calls(), 3);
    assert!(!outcome.citations_valid);
    assert!(outcome.answer.contains("Warning: Some citations could not be verified"));
    assert!(outcome
        .validation_errors
        .iter()
        .any(|err| err.contains("statement.txt") && err.contains("Excerpt not found")));
    // The answer itself is preserved, not dropped.
    assert!(outcome.answer.contains("resigned in 2020"));
}

#[tokio::test]
async fn missing_citations_with_available_evidence_is_an_error() {
    let h = harness(
        vec!["The client started in March 2023, as far as I recall."],
        vec!["gov.uk".into()],
        None,
    );
    let case = CaseId::new("uncited").unwrap();
    h.assistant.create_case(&case).await.unwrap();
    upload_statement(&h, &case).await;

    let outcome = h
        .assistant
        .ask(&case, "When did the client start employment?")
        .await
        .unwrap();

    assert_eq!(h.chat.calls(), 3);
    assert!(!outcome.citations_valid);
    assert!(outcome
        .validation_errors
        .iter()
        .any(|err| err.contains("No citations found despite available evidence")));
}

#[tokio::test]
async fn empty_case_accepts_uncited_answer() {
    let h = harness(
        vec!["This information does not appear in the current case documents."],
        vec!["gov.uk".into()],
        None,
    );
    let case = CaseId::new("nocase").unwrap();
    h.assistant.create_case(&case).await.unwrap();

    let outcome = h
        .assistant
        .ask(&case, "When did the client start employment?")
        .await
        .unwrap();

    assert!(outcome.citations_valid);
    assert!(outcome.citations.is_empty());
    assert_eq!(h.chat.calls(), 1);
}

//! Fetcher gating and snapshot cache behavior against a local mock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use tempfile::TempDir;

use citesmith::legal::{LegalSearch, LegalSourceFetcher, SearchSite, SnapshotCache, Whitelist};
use citesmith::types::SystemClock;
use citesmith::CoreError;

fn fetcher_with(whitelist: &[&str], cache_dir: &TempDir) -> Arc<LegalSourceFetcher> {
    let cache = Arc::new(SnapshotCache::new(cache_dir.path(), Arc::new(SystemClock)));
    Arc::new(
        LegalSourceFetcher::new(
            cache,
            Whitelist::new(whitelist.iter().copied()),
            Duration::from_secs(5),
        )
        .expect("fetcher builds"),
    )
}

#[tokio::test]
async fn non_whitelisted_domain_fails_before_any_network_io() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200).body("<html><body>hi</body></html>");
        })
        .await;

    let cache_dir = TempDir::new().unwrap();
    // The server's own host is deliberately NOT whitelisted.
    let fetcher = fetcher_with(&["gov.uk"], &cache_dir);

    let err = fetcher
        .fetch(&server.url("/page"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DomainNotAllowed { ref domain } if domain == "127.0.0.1"));

    // Zero requests reached the server and the cache stayed empty.
    assert_eq!(mock.hits_async().await, 0);
    assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn second_fetch_is_served_from_the_cache() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/notice-periods");
            then.status(200)
                .header("content-type", "text/html")
                .body(
                    "<html><head><title>Notice periods</title></head>\
                     <body><main><p>Statutory notice is one week per year of service.</p></main></body></html>",
                );
        })
        .await;

    let cache_dir = TempDir::new().unwrap();
    let fetcher = fetcher_with(&["127.0.0.1"], &cache_dir);
    let url = server.url("/notice-periods");

    let first = fetcher.fetch(&url, false).await.unwrap();
    let second = fetcher.fetch(&url, false).await.unwrap();

    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(first.id, second.id);
    assert_eq!(first.text, second.text);
    assert_eq!(first.html, second.html);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.title, "Notice periods");
    assert!(first.text.contains("one week per year of service"));

    // Force refresh goes back to the network, same id.
    let third = fetcher.fetch(&url, true).await.unwrap();
    assert_eq!(mock.hits_async().await, 2);
    assert_eq!(third.id, first.id);
}

#[tokio::test]
async fn http_errors_surface_as_fetch_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/broken");
            then.status(500);
        })
        .await;

    let cache_dir = TempDir::new().unwrap();
    let fetcher = fetcher_with(&["127.0.0.1"], &cache_dir);

    let err = fetcher
        .fetch(&server.url("/broken"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Fetch { .. }));
}

#[tokio::test]
async fn search_helper_snapshots_whitelisted_candidates_and_skips_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/search");
            then.status(200).body(
                r#"<html><body><ul>
                    <li class="result"><a href="/guidance/notice">Notice</a></li>
                    <li class="result"><a href="https://evil.example.com/offsite">Offsite</a></li>
                    <li class="result"><a href="/guidance/missing">Missing</a></li>
                </ul></body></html>"#,
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/guidance/notice");
            then.status(200)
                .body("<html><body><main>Notice guidance text.</main></body></html>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/guidance/missing");
            then.status(404);
        })
        .await;

    let cache_dir = TempDir::new().unwrap();
    let fetcher = fetcher_with(&["127.0.0.1"], &cache_dir);
    let search = LegalSearch::with_sites(
        fetcher,
        vec![SearchSite::new(
            "Mock site",
            server.url("/search"),
            "q",
            ".result a",
            5,
        )],
    );

    let snapshots = search.sources_for_query("notice", 5).await.unwrap();

    // The offsite candidate is refused by the whitelist and the 404 is
    // skipped; only the good page survives.
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].url.ends_with("/guidance/notice"));
    assert!(snapshots[0].text.contains("Notice guidance text."));
}

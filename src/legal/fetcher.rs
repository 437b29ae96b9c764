//! Domain-gated fetching of legal web sources.
//!
//! The whitelist check runs before any network I/O; a URL outside the
//! whitelist fails with `DomainNotAllowed` without a request ever being
//! built. Allowed URLs hit the snapshot cache first, and fresh fetches are
//! parsed down to readable text before being persisted.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::legal::Whitelist;
use crate::legal::snapshots::SnapshotCache;
use crate::types::{CoreError, Snapshot};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; CitesmithBot/0.1; legal research)";

/// Elements whose subtrees never contribute to extracted text.
const STRIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "header"];

/// Containers tried in preference order before falling back to the whole
/// document.
const MAIN_SELECTORS: &[&str] = &["main", "article", "[role='main']", ".content", "#content"];

pub struct LegalSourceFetcher {
    client: Client,
    cache: Arc<SnapshotCache>,
    whitelist: Whitelist,
}

impl LegalSourceFetcher {
    pub fn new(
        cache: Arc<SnapshotCache>,
        whitelist: Whitelist,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .use_rustls_tls()
            .build()?;
        Ok(Self {
            client,
            cache,
            whitelist,
        })
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Fetches a whitelisted URL, serving from the snapshot cache unless
    /// `force_refresh` is set.
    ///
    /// ```text
    /// [start] ── not whitelisted ──► DomainNotAllowed
    ///         ── cache hit, !force ─► cached snapshot
    ///         ── miss or force ────► GET ──► parse ──► persist ──► snapshot
    ///                                 └── transport/HTTP error ──► Fetch
    /// ```
    pub async fn fetch(&self, url: &str, force_refresh: bool) -> Result<Snapshot, CoreError> {
        let parsed = Url::parse(url).map_err(|err| CoreError::Fetch {
            url: url.to_string(),
            reason: format!("invalid URL: {err}"),
        })?;

        if !self.whitelist.allows_url(&parsed) {
            return Err(CoreError::DomainNotAllowed {
                domain: parsed.host_str().unwrap_or_default().to_string(),
            });
        }

        if !force_refresh {
            if let Some(cached) = self.cache.by_url(&parsed).await? {
                debug!(url, "snapshot cache hit");
                return Ok(cached);
            }
        }

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| CoreError::Fetch {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        let html = response.text().await.map_err(|err| CoreError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        let (title, text) = extract_readable(&html)?;
        let snapshot = self.cache.store(&parsed, html, text, title).await?;
        info!(url, id = %snapshot.id, "legal source snapshotted");
        Ok(snapshot)
    }
}

/// Pulls the page title and the readable text out of raw HTML.
pub(crate) fn extract_readable(html: &str) -> Result<(String, String), CoreError> {
    let document = Html::parse_document(html);

    let title_selector =
        Selector::parse("title").map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut container = None;
    for selector in MAIN_SELECTORS {
        let selector =
            Selector::parse(selector).map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
        if let Some(found) = document.select(&selector).next() {
            container = Some(found);
            break;
        }
    }
    let root = container.unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);

    let cleaned: String = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    static NEWLINE_RUNS: OnceLock<Regex> = OnceLock::new();
    let squeeze = NEWLINE_RUNS.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    let text = squeeze.replace_all(&cleaned, "\n\n").into_owned();

    Ok((title, text))
}

/// Depth-first text collection that skips stripped subtrees entirely.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if STRIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push('\n');
        }
    }
}

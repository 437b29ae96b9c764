//! Best-effort search across the whitelisted legal sites.
//!
//! Each site's public search page is scraped with CSS selectors; candidate
//! URLs are then pulled through the fetcher, so the whitelist gate applies
//! to everything that ends up as a snapshot. Per-source failures are logged
//! and skipped; the helper returns whatever succeeded.

use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::legal::fetcher::LegalSourceFetcher;
use crate::types::{CoreError, Snapshot};

/// One scrapeable search page: where to send the query and how to find
/// result links in the returned HTML.
#[derive(Clone, Debug)]
pub struct SearchSite {
    pub name: String,
    pub endpoint: String,
    pub query_param: String,
    pub item_selector: String,
    pub max_results: usize,
}

impl SearchSite {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        query_param: impl Into<String>,
        item_selector: impl Into<String>,
        max_results: usize,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            query_param: query_param.into(),
            item_selector: item_selector.into(),
            max_results,
        }
    }

    /// The whitelisted sites with scrapeable public search pages.
    pub fn default_sites() -> Vec<SearchSite> {
        vec![
            SearchSite::new(
                "GOV.UK",
                "https://www.gov.uk/search/all",
                "keywords",
                ".gem-c-document-list__item a",
                3,
            ),
            SearchSite::new(
                "Acas",
                "https://www.acas.org.uk/search",
                "query",
                ".search-results__list a",
                2,
            ),
            SearchSite::new(
                "Citizens Advice",
                "https://www.citizensadvice.org.uk/search/",
                "q",
                ".cads-search-result a",
                2,
            ),
        ]
    }
}

pub struct LegalSearch {
    fetcher: Arc<LegalSourceFetcher>,
    sites: Vec<SearchSite>,
}

impl LegalSearch {
    pub fn new(fetcher: Arc<LegalSourceFetcher>) -> Self {
        Self::with_sites(fetcher, SearchSite::default_sites())
    }

    pub fn with_sites(fetcher: Arc<LegalSourceFetcher>, sites: Vec<SearchSite>) -> Self {
        Self { fetcher, sites }
    }

    /// Searches every configured site and snapshots up to `limit` of the
    /// candidate pages.
    pub async fn sources_for_query(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>, CoreError> {
        let mut snapshots: Vec<Snapshot> = Vec::new();

        for site in &self.sites {
            if snapshots.len() >= limit {
                break;
            }

            let candidates = match self.site_candidates(site, query).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(site = %site.name, error = %err, "search page unavailable, skipping");
                    continue;
                }
            };
            debug!(site = %site.name, candidates = candidates.len(), "search candidates");

            for candidate in candidates {
                if snapshots.len() >= limit {
                    break;
                }
                if snapshots.iter().any(|s| s.url == candidate.as_str()) {
                    continue;
                }
                match self.fetcher.fetch(candidate.as_str(), false).await {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(err) => {
                        warn!(url = %candidate, error = %err, "candidate fetch failed, skipping");
                    }
                }
            }
        }

        Ok(snapshots)
    }

    async fn site_candidates(
        &self,
        site: &SearchSite,
        query: &str,
    ) -> Result<Vec<Url>, CoreError> {
        let search_url =
            Url::parse_with_params(&site.endpoint, &[(site.query_param.as_str(), query)])
                .map_err(|err| CoreError::Fetch {
                    url: site.endpoint.clone(),
                    reason: err.to_string(),
                })?;

        let response = self
            .fetcher
            .http_client()
            .get(search_url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| CoreError::Fetch {
                url: search_url.to_string(),
                reason: err.to_string(),
            })?;
        let body = response.text().await.map_err(|err| CoreError::Fetch {
            url: search_url.to_string(),
            reason: err.to_string(),
        })?;

        parse_result_links(&body, &site.item_selector, &search_url, site.max_results)
    }
}

/// Pulls result links out of a search page, absolutized against the search
/// URL, deduplicated, fragment-free.
fn parse_result_links(
    html: &str,
    item_selector: &str,
    base: &Url,
    max_results: usize,
) -> Result<Vec<Url>, CoreError> {
    let selector = Selector::parse(item_selector)
        .map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
    let document = Html::parse_document(html);

    let mut links = Vec::new();
    for element in document.select(&selector) {
        if links.len() >= max_results {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') {
            continue;
        }
        if let Ok(mut url) = base.join(href) {
            url.set_fragment(None);
            if !links.iter().any(|existing| existing == &url) {
                links.push(url);
            }
        }
    }

    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_absolutizes_result_links() {
        let html = r##"
            <ul>
                <li class="gem-c-document-list__item"><a href="/holiday-entitlement-rights">Holiday</a></li>
                <li class="gem-c-document-list__item"><a href="#fragment-only">Skip</a></li>
                <li class="gem-c-document-list__item"><a href="https://www.gov.uk/notice-periods#s1">Notice</a></li>
                <li class="gem-c-document-list__item"><a href="/holiday-entitlement-rights">Duplicate</a></li>
                <li class="gem-c-document-list__item"><a href="/fourth-result">Fourth</a></li>
            </ul>
        "##;
        let base = Url::parse("https://www.gov.uk/search/all?keywords=holiday").unwrap();

        let links = parse_result_links(html, ".gem-c-document-list__item a", &base, 3).unwrap();
        let strings: Vec<_> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            strings,
            vec![
                "https://www.gov.uk/holiday-entitlement-rights",
                "https://www.gov.uk/notice-periods",
                "https://www.gov.uk/fourth-result",
            ]
        );
    }

    #[test]
    fn default_sites_cover_the_whitelist() {
        let sites = SearchSite::default_sites();
        assert_eq!(sites.len(), 3);
        assert!(sites.iter().all(|site| site.max_results > 0));
    }
}

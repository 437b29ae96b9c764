//! Whitelisted legal sources: the domain gate, the snapshot cache, the
//! fetcher, and the best-effort site search helper.

pub mod fetcher;
pub mod search;
pub mod snapshots;

use url::Url;

pub use fetcher::LegalSourceFetcher;
pub use search::{LegalSearch, SearchSite};
pub use snapshots::SnapshotCache;

/// Ordered list of citable domains.
///
/// A URL is accepted iff its host equals an entry or ends with
/// `"." + entry`; there is no other authority ranking. The same check runs
/// in the fetcher (before any network I/O) and again in the citation
/// validator, which never assumes a cached snapshot is still from a
/// whitelisted domain.
#[derive(Clone, Debug)]
pub struct Whitelist {
    domains: Vec<String>,
}

impl Whitelist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.into().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.domains
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn allows_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| self.allows_host(host))
    }
}

//! Content-addressed snapshot cache for fetched legal pages.
//!
//! Layout: `<root>/<domain>/<url-hash>/{source.html, source.txt, meta.json}`.
//! The hash is the first 16 hex digits of SHA-256 over the URL, so a URL
//! always maps to the same entry. The stored text is the canonical source
//! the citation validator checks quoted excerpts against: once written it is
//! only ever replaced wholesale by a force refresh, never edited.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;
use url::Url;

use crate::store::documents::write_json_atomic;
use crate::types::{Clock, CoreError, Snapshot};

const HTML_FILE: &str = "source.html";
const TEXT_FILE: &str = "source.txt";
const META_FILE: &str = "meta.json";
const EXCERPT_CHARS: usize = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    id: String,
    url: String,
    domain: String,
    title: String,
    content_hash: String,
    fetched_at: DateTime<Utc>,
}

/// Deterministic snapshot id for a URL.
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}")[..16].to_string()
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Filesystem-backed, cross-case snapshot store.
#[derive(Clone)]
pub struct SnapshotCache {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, url: &Url) -> PathBuf {
        let domain = url.host_str().unwrap_or("unknown").to_lowercase();
        self.root.join(domain).join(url_hash(url.as_str()))
    }

    /// Persists a fetched page. Each file is written to a temp sibling and
    /// renamed into place, so concurrent readers never see partial content.
    pub async fn store(
        &self,
        url: &Url,
        html: String,
        text: String,
        title: String,
    ) -> Result<Snapshot, CoreError> {
        let domain = url.host_str().unwrap_or("unknown").to_lowercase();
        let id = url_hash(url.as_str());
        let fetched_at = self.clock.now();
        let hash = content_hash(&text);

        let dir = self.entry_dir(url);
        fs::create_dir_all(&dir).await?;

        write_file_atomic(&dir.join(HTML_FILE), &html).await?;
        write_file_atomic(&dir.join(TEXT_FILE), &text).await?;

        let meta = SnapshotMeta {
            id: id.clone(),
            url: url.as_str().to_string(),
            domain: domain.clone(),
            title: title.clone(),
            content_hash: hash.clone(),
            fetched_at,
        };
        write_json_atomic(&dir.join(META_FILE), &meta).await?;

        Ok(Snapshot {
            id,
            url: url.as_str().to_string(),
            domain,
            title,
            excerpt: excerpt_of(&text),
            text,
            html,
            content_hash: hash,
            fetched_at,
        })
    }

    /// Cached snapshot for a URL, if any.
    pub async fn by_url(&self, url: &Url) -> Result<Option<Snapshot>, CoreError> {
        let dir = self.entry_dir(url);
        if !fs::try_exists(dir.join(META_FILE)).await? {
            return Ok(None);
        }
        Ok(self.load_entry(&dir).await)
    }

    /// Cached snapshot by id, scanning every domain directory.
    pub async fn by_id(&self, id: &str) -> Result<Option<Snapshot>, CoreError> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        if !fs::try_exists(&self.root).await? {
            return Ok(None);
        }

        let mut domains = fs::read_dir(&self.root).await?;
        while let Some(entry) = domains.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let candidate = entry.path().join(id);
            if fs::try_exists(candidate.join(META_FILE)).await? {
                return Ok(self.load_entry(&candidate).await);
            }
        }
        Ok(None)
    }

    /// Text content for a snapshot id; what the validator matches excerpts
    /// against.
    pub async fn text_of(&self, id: &str) -> Result<Option<String>, CoreError> {
        Ok(self.by_id(id).await?.map(|snapshot| snapshot.text))
    }

    async fn load_entry(&self, dir: &Path) -> Option<Snapshot> {
        let meta_raw = fs::read_to_string(dir.join(META_FILE)).await.ok()?;
        let meta: SnapshotMeta = match serde_json::from_str(&meta_raw) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "corrupt snapshot metadata");
                return None;
            }
        };

        let text = fs::read_to_string(dir.join(TEXT_FILE)).await.unwrap_or_default();
        let html = fs::read_to_string(dir.join(HTML_FILE)).await.unwrap_or_default();

        Some(Snapshot {
            id: meta.id,
            url: meta.url,
            domain: meta.domain,
            title: meta.title,
            excerpt: excerpt_of(&text),
            text,
            html,
            content_hash: meta.content_hash,
            fetched_at: meta.fetched_at,
        })
    }
}

fn excerpt_of(text: &str) -> String {
    let prefix: String = text.chars().take(EXCERPT_CHARS).collect();
    let trimmed = prefix.trim().to_string();
    if text.chars().count() > EXCERPT_CHARS {
        format!("{trimmed}...")
    } else {
        trimmed
    }
}

async fn write_file_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

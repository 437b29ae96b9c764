//! Four-check citation validation.
//!
//! Every parsed citation must pass all checks: the referenced snapshot or
//! chunk resolves, the locator is consistent with what resolved, legal
//! sources are (still) whitelisted, and the quoted excerpt actually appears
//! in the stored text. The whitelist is re-checked here on purpose — a
//! cached snapshot is never trusted to be from a domain that is still
//! allowed.

use std::sync::Arc;

use url::Url;

use crate::legal::Whitelist;
use crate::legal::snapshots::SnapshotCache;
use crate::paths::CaseId;
use crate::store::DocumentIndex;
use crate::types::{Citation, CoreError, SourceKind};

const FUZZY_MATCH_THRESHOLD: f64 = 0.8;
const MIN_FUZZY_WORDS: usize = 3;

/// Outcome of validating one citation.
#[derive(Clone, Debug)]
pub struct CitationCheck {
    pub citation: Citation,
    pub ok: bool,
    pub reason: String,
}

pub struct CitationValidator {
    documents: Arc<DocumentIndex>,
    snapshots: Arc<SnapshotCache>,
    whitelist: Whitelist,
}

impl CitationValidator {
    pub fn new(
        documents: Arc<DocumentIndex>,
        snapshots: Arc<SnapshotCache>,
        whitelist: Whitelist,
    ) -> Self {
        Self {
            documents,
            snapshots,
            whitelist,
        }
    }

    pub async fn validate(
        &self,
        case: &CaseId,
        citation: &Citation,
    ) -> Result<(bool, String), CoreError> {
        match citation.source {
            SourceKind::Legal => self.validate_legal(citation).await,
            SourceKind::Client => self.validate_client(case, citation).await,
        }
    }

    /// Validates every citation; the result list is index-aligned with the
    /// input and re-running it never mutates anything.
    pub async fn validate_all(
        &self,
        case: &CaseId,
        citations: &[Citation],
    ) -> Result<Vec<CitationCheck>, CoreError> {
        let mut checks = Vec::with_capacity(citations.len());
        for citation in citations {
            let (ok, reason) = self.validate(case, citation).await?;
            checks.push(CitationCheck {
                citation: citation.clone(),
                ok,
                reason,
            });
        }
        Ok(checks)
    }

    /// Aggregate verdict plus one human-readable line per failing citation,
    /// led by the most identifying locator (URL for legal, file name for
    /// client).
    pub async fn all_valid(
        &self,
        case: &CaseId,
        citations: &[Citation],
    ) -> Result<(bool, Vec<String>), CoreError> {
        let checks = self.validate_all(case, citations).await?;
        let errors: Vec<String> = checks
            .iter()
            .filter(|check| !check.ok)
            .map(|check| {
                let locator = match check.citation.source {
                    SourceKind::Legal => check.citation.url.clone(),
                    SourceKind::Client => check.citation.file_name.clone(),
                };
                format!(
                    "{}: {}",
                    locator.unwrap_or_else(|| "unknown source".to_string()),
                    check.reason
                )
            })
            .collect();
        Ok((errors.is_empty(), errors))
    }

    async fn validate_legal(&self, citation: &Citation) -> Result<(bool, String), CoreError> {
        // Check 1: the snapshot exists.
        let Some(snapshot) = self.snapshots.by_id(&citation.id).await? else {
            return Ok((false, format!("Unknown citation ID: {}", citation.id)));
        };

        // Check 2: the cited URL matches the stored one.
        if let Some(url) = &citation.url {
            if *url != snapshot.url {
                return Ok((
                    false,
                    format!(
                        "URL mismatch: cited '{}' but source has '{}'",
                        url, snapshot.url
                    ),
                ));
            }
        }

        // Check 3: the snapshot's domain is still whitelisted.
        let host = Url::parse(&snapshot.url)
            .ok()
            .and_then(|url| url.host_str().map(|host| host.to_lowercase()))
            .unwrap_or_default();
        if !self.whitelist.allows_host(&host) {
            return Ok((false, format!("Domain not whitelisted: {host}")));
        }

        // Check 4: the excerpt appears in the snapshot text.
        Ok(check_excerpt(&citation.excerpt, &snapshot.text, None))
    }

    async fn validate_client(
        &self,
        case: &CaseId,
        citation: &Citation,
    ) -> Result<(bool, String), CoreError> {
        let Some(file_name) = &citation.file_name else {
            return Ok((false, "Client citation has no file_name".to_string()));
        };

        // Check 1: resolve by chunk id first, then by (file, page?).
        let mut source_text = None;
        if !citation.id.is_empty() {
            source_text = self.documents.chunk_text(case, &citation.id).await?;
        }
        if source_text.is_none() {
            source_text = self
                .documents
                .raw_text(case, file_name, citation.page_num)
                .await?;
        }
        let Some(source_text) = source_text else {
            return Ok((false, format!("Source document not found: {file_name}")));
        };

        // Checks 2 and 4: the resolved text is keyed by the cited file name,
        // and the excerpt must appear in it.
        Ok(check_excerpt(
            &citation.excerpt,
            &source_text,
            Some(file_name),
        ))
    }
}

fn check_excerpt(excerpt: &str, source_text: &str, file_name: Option<&str>) -> (bool, String) {
    if excerpt.is_empty() {
        return (false, "Citation has no excerpt".to_string());
    }

    if excerpt_matches(excerpt, source_text) {
        (true, "Valid".to_string())
    } else {
        match file_name {
            Some(file) => (false, format!("Excerpt not found in {file}")),
            None => (false, "Excerpt not found in source text".to_string()),
        }
    }
}

/// Normalized-substring match, with a positional sliding-window fallback for
/// excerpts of at least three words.
pub(crate) fn excerpt_matches(excerpt: &str, source_text: &str) -> bool {
    let normalized_excerpt = normalize(excerpt);
    let normalized_source = normalize(source_text);

    if normalized_source.contains(&normalized_excerpt) {
        return true;
    }
    fuzzy_excerpt_match(&normalized_excerpt, &normalized_source, FUZZY_MATCH_THRESHOLD)
}

/// Lowercase, collapse whitespace runs to single spaces, trim.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Slides a window of the excerpt's length over the source words and
/// passes when any window's same-index word match rate reaches the
/// threshold. Excerpts under [`MIN_FUZZY_WORDS`] words never fuzzy-match.
fn fuzzy_excerpt_match(normalized_excerpt: &str, normalized_source: &str, threshold: f64) -> bool {
    let excerpt_words: Vec<&str> = normalized_excerpt.split_whitespace().collect();
    let source_words: Vec<&str> = normalized_source.split_whitespace().collect();

    if excerpt_words.len() < MIN_FUZZY_WORDS {
        return false;
    }

    let window = excerpt_words.len();
    if source_words.len() < window {
        return false;
    }

    for start in 0..=(source_words.len() - window) {
        let matches = excerpt_words
            .iter()
            .zip(&source_words[start..start + window])
            .filter(|(a, b)| a == b)
            .count();
        if matches as f64 / window as f64 >= threshold {
            return true;
        }
    }

    false
}

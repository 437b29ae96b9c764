//! Core data model shared across the ingestion, retrieval, and answering
//! pipeline, plus the crate-wide error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the evidence divide a result or citation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Client-uploaded case documents.
    Client,
    /// Whitelisted legal web sources.
    Legal,
}

/// Machine-readable pointer from a chunk back to its location in a source
/// document.
///
/// Exactly one of `page_num` (paginated sources) or `para_idx` (flow sources)
/// is set, both 1-indexed. `char_start`/`char_end` are approximate hints, not
/// authoritative offsets; nothing in the pipeline depends on their accuracy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProvenance {
    pub chunk_id: String,
    pub file_name: String,
    pub page_num: Option<u32>,
    pub para_idx: Option<u32>,
    pub char_start: usize,
    pub char_end: usize,
    /// True when the text was recovered via OCR rather than direct extraction.
    pub ocr: bool,
}

impl ChunkProvenance {
    /// Human-readable locator for prompts and evidence displays.
    pub fn locator(&self) -> String {
        match (self.page_num, self.para_idx) {
            (Some(page), _) => format!("Page {page}"),
            (None, Some(para)) => format!("Para {para}"),
            (None, None) => String::new(),
        }
    }
}

/// The atomic unit of client evidence: a span of verbatim text plus its
/// provenance. Immutable once indexed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub text: String,
    pub provenance: ChunkProvenance,
}

impl EvidenceChunk {
    pub fn id(&self) -> &str {
        &self.provenance.chunk_id
    }
}

/// A retrieval hit with its (fused or raw) relevance score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
    pub provenance: ChunkProvenance,
    pub source: SourceKind,
}

impl SearchResult {
    pub fn from_chunk(chunk: EvidenceChunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.provenance.chunk_id.clone(),
            text: chunk.text,
            score,
            provenance: chunk.provenance,
            source: SourceKind::Client,
        }
    }
}

/// A content-addressed capture of one whitelisted web page at one fetch time.
///
/// `id` is the first 16 hex digits of SHA-256 over the URL; `content_hash`
/// covers the extracted text. Snapshots are write-once: cached reads never
/// mutate, and a force refresh overwrites the entry under the same id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub url: String,
    pub domain: String,
    pub title: String,
    /// Display excerpt, always a prefix of `text`.
    pub excerpt: String,
    pub text: String,
    pub html: String,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

/// A claim parsed out of a generated answer, pending validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
    /// Snapshot id (legal) or chunk id guess (client); may be empty when the
    /// cited URL matches no snapshot that was offered to the model.
    pub id: String,
    pub source: SourceKind,
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub page_num: Option<u32>,
    pub excerpt: String,
}

/// Summary of one indexed document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub file_name: String,
    pub chunk_count: usize,
    pub ocr_applied: bool,
    pub indexed_at: DateTime<Utc>,
}

/// What the answer engine hands back for a question. Citation problems never
/// surface as errors; they are reported through `citations_valid` and
/// `validation_errors`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub answer: String,
    pub client_evidence: Vec<SearchResult>,
    pub legal_sources: Vec<Snapshot>,
    pub citations: Vec<Citation>,
    pub citations_valid: bool,
    pub validation_errors: Vec<String>,
}

/// Time source, injected so snapshot and index timestamps are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock [`Clock`] used outside tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Crate-wide error type.
///
/// Variants are roles, not layers: boundary guards raise `PathValidation`,
/// the chunker raises `UnsupportedFormat`/`Ocr`, providers raise
/// `Embedding`/`Completion`, stores raise `Storage`, and the fetcher raises
/// `DomainNotAllowed`/`Fetch`. Citation validation failures are ordinary
/// values (see the engine), not errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid path: {0}")]
    PathValidation(String),

    #[error("case not found: {0}")]
    CaseNotFound(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("completion provider error: {0}")]
    Completion(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("domain '{domain}' is not whitelisted")]
    DomainNotAllowed { domain: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_prefers_page_over_para() {
        let prov = ChunkProvenance {
            chunk_id: "abc123de".into(),
            file_name: "contract.pdf".into(),
            page_num: Some(4),
            para_idx: None,
            char_start: 0,
            char_end: 10,
            ocr: false,
        };
        assert_eq!(prov.locator(), "Page 4");

        let flow = ChunkProvenance {
            page_num: None,
            para_idx: Some(7),
            ..prov
        };
        assert_eq!(flow.locator(), "Para 7");
    }

    #[test]
    fn domain_not_allowed_names_the_domain() {
        let err = CoreError::DomainNotAllowed {
            domain: "evil.example.com".into(),
        };
        assert!(err.to_string().contains("evil.example.com"));
    }
}

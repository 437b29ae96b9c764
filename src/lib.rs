//! Grounded answering for legal casework.
//!
//! ```text
//! client file ──► ingest (extract / OCR / chunk) ──► DocumentIndex
//!                                  │                      │
//!                                  └──► VectorBackend     │
//!                                            │            │
//! question ──► HybridRetriever ◄─── lexical BM25 ◄────────┘
//!                  │
//!                  ├──► LegalSearch ──► LegalSourceFetcher ──► SnapshotCache
//!                  │
//!                  └──► AnswerEngine ──► prompt ──► ChatModel
//!                              │
//!                              └──► citation parse ──► CitationValidator
//!                                        │
//!                              retry (stricter prompt) or AnswerOutcome
//! ```
//!
//! The pipeline's contract: every factual claim in a returned answer carries
//! a citation whose quoted excerpt can be mechanically verified against
//! either a stored client chunk or a cached snapshot of a whitelisted legal
//! web page. Retrieval fuses per-case BM25 and vector search; the fetcher
//! refuses non-whitelisted domains before any network I/O; the validator
//! re-checks the whitelist so stale snapshots cannot outlive a whitelist
//! change.
//!
//! External capabilities — embeddings, chat completion, format extraction,
//! OCR, the clock — are injected through [`assistant::AssistantBuilder`],
//! with rig-backed implementations for OpenAI-compatible endpoints and
//! deterministic fakes for tests.

pub mod assistant;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod ingest;
pub mod legal;
pub mod paths;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod types;

pub use assistant::{Assistant, AssistantBuilder};
pub use completion::{ChatModel, RigChatModel};
pub use config::Settings;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, RigEmbeddingProvider};
pub use engine::{AnswerEngine, CitationValidator};
pub use legal::{LegalSourceFetcher, SnapshotCache, Whitelist};
pub use paths::{CaseId, CaseLayout};
pub use retrieval::{HybridRetriever, LexicalIndex, SearchOptions};
pub use store::{DocumentIndex, SqliteEvidenceStore, VectorBackend};
pub use types::{
    AnswerOutcome, ChunkProvenance, Citation, CoreError, DocumentInfo, EvidenceChunk,
    SearchResult, Snapshot, SourceKind,
};

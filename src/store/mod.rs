//! Persistent evidence storage.
//!
//! Two stores cooperate per case: the [`DocumentIndex`] owns provenance and
//! verbatim chunk text on disk, and a [`VectorBackend`] owns the embedding
//! side for similarity search. The [`VectorBackend`] trait keeps retrieval
//! and ingestion code independent of the concrete ANN store.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  VectorBackend   │
//!                  │   (async CRUD)   │
//!                  └────────┬─────────┘
//!                           │
//!                           ▼
//!                 ┌───────────────────┐
//!                 │ SqliteEvidenceStore│
//!                 │    (sqlite-vec)    │
//!                 └───────────────────┘
//! ```

pub mod documents;
pub mod sqlite;

use async_trait::async_trait;

use crate::paths::CaseId;
use crate::types::{CoreError, EvidenceChunk};

pub use documents::DocumentIndex;
pub use sqlite::SqliteEvidenceStore;

/// Per-case persistent store mapping chunk ids to embedding vectors.
///
/// Returned query distances grow with dissimilarity; converting distance to
/// a similarity score is the retriever's job, not the store's.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Inserts chunks with their embeddings into the case partition.
    async fn add_chunks(
        &self,
        case: &CaseId,
        chunks: Vec<(EvidenceChunk, Vec<f32>)>,
    ) -> Result<(), CoreError>;

    /// Deletes the given chunk ids from the case partition, returning how
    /// many rows were removed.
    async fn delete_chunks(&self, case: &CaseId, chunk_ids: &[String])
    -> Result<usize, CoreError>;

    /// Nearest-neighbor query; results are `(chunk, distance)` ordered by
    /// ascending distance.
    async fn query(
        &self,
        case: &CaseId,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(EvidenceChunk, f32)>, CoreError>;

    /// Number of chunks stored for the case.
    async fn count(&self, case: &CaseId) -> Result<usize, CoreError>;

    /// Removes the entire case partition.
    async fn drop_case(&self, case: &CaseId) -> Result<(), CoreError>;
}

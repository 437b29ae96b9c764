//! Document ingestion pipeline and case lifecycle.
//!
//! ```text
//! source file ──► DocumentExtractor ──► (OCR retry?) ──► chunker
//!                                                          │
//!                    embeddings ◄──────────────────────────┘
//!                        │
//!                        ├─► VectorBackend (per-case partition)
//!                        └─► DocumentIndex (provenance + raw text)
//!                                │
//!                                └─► lexical index invalidation
//! ```
//!
//! Embeddings are computed before anything is written, so a provider failure
//! leaves the case untouched. OCR failures only downgrade the extraction;
//! they never fail an upload.

pub mod chunker;
pub mod extract;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::paths::{CaseId, CaseLayout, validate_file_name};
use crate::retrieval::lexical::LexicalIndex;
use crate::store::{DocumentIndex, VectorBackend};
use crate::types::{CoreError, DocumentInfo};

pub use chunker::{ChunkingOptions, chunk_document, chunk_unit};
pub use extract::{
    DocumentExtractor, OcrEngine, OcrMyPdf, PageText, Paragraph, PlainTextExtractor, RawDocument,
};

/// Orchestrates uploads and deletions for a case.
pub struct Ingestor {
    layout: CaseLayout,
    documents: Arc<DocumentIndex>,
    vectors: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<LexicalIndex>,
    extractors: Vec<Arc<dyn DocumentExtractor>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    options: ChunkingOptions,
    ocr_text_threshold: usize,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: CaseLayout,
        documents: Arc<DocumentIndex>,
        vectors: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        lexical: Arc<LexicalIndex>,
        extractors: Vec<Arc<dyn DocumentExtractor>>,
        ocr: Option<Arc<dyn OcrEngine>>,
        options: ChunkingOptions,
        ocr_text_threshold: usize,
    ) -> Self {
        Self {
            layout,
            documents,
            vectors,
            embedder,
            lexical,
            extractors,
            ocr,
            options,
            ocr_text_threshold,
        }
    }

    pub async fn create_case(&self, case: &CaseId) -> Result<(), CoreError> {
        self.layout.ensure_case(case).await?;
        Ok(())
    }

    /// Deletes a case and everything derived from it.
    pub async fn delete_case(&self, case: &CaseId) -> Result<(), CoreError> {
        let dir = self.layout.existing_case(case).await?;
        tokio::fs::remove_dir_all(&dir).await?;
        self.vectors.drop_case(case).await?;
        self.lexical.invalidate(case);
        info!(case = %case, "case deleted");
        Ok(())
    }

    /// Ingests one file into a case: extract, (maybe) OCR, chunk, embed,
    /// persist. The file is copied into the case directory first so chunk
    /// provenance always points at a file that exists in the case.
    pub async fn ingest_file(&self, case: &CaseId, source: &Path) -> Result<DocumentInfo, CoreError> {
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| CoreError::PathValidation("source path has no file name".to_string()))?
            .to_string();
        validate_file_name(&file_name)?;
        self.layout.ensure_case(case).await?;

        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if extension == "doc" {
            return Err(CoreError::UnsupportedFormat(
                ".doc is not supported; convert to .docx".to_string(),
            ));
        }
        let extractor = self
            .extractors
            .iter()
            .find(|extractor| extractor.supports(&extension))
            .ok_or_else(|| {
                CoreError::UnsupportedFormat(format!("no extractor for '.{extension}' files"))
            })?;

        let destination = self.layout.upload_path(case, &file_name)?;
        if source != destination {
            tokio::fs::copy(source, &destination).await?;
        }

        let mut raw = extractor.extract(&destination).await?;
        let mut ocr_applied = false;

        if let Some(density) = raw.chars_per_page() {
            if density < self.ocr_text_threshold as f64 {
                match self.run_ocr(&destination).await {
                    Ok(Some(searchable)) => {
                        raw = extractor.extract(&searchable).await?;
                        ocr_applied = true;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(case = %case, file = %file_name, error = %err,
                            "OCR failed, continuing with raw extraction");
                    }
                }
            }
        }

        let chunks = chunk_document(&raw, &file_name, ocr_applied, &self.options);

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                // Nothing was indexed yet; drop the copied file so the
                // failed upload leaves no trace in the case.
                if source != destination {
                    let _ = tokio::fs::remove_file(&destination).await;
                }
                return Err(err);
            }
        };

        self.vectors
            .add_chunks(
                case,
                chunks.iter().cloned().zip(embeddings).collect(),
            )
            .await?;
        let info = self.documents.index_document(case, &file_name, &chunks).await?;
        self.lexical.invalidate(case);

        info!(case = %case, file = %file_name, chunks = info.chunk_count,
            ocr = info.ocr_applied, "document ingested");
        Ok(info)
    }

    async fn run_ocr(&self, path: &Path) -> Result<Option<std::path::PathBuf>, CoreError> {
        match &self.ocr {
            Some(engine) => engine.make_searchable(path).await.map(Some),
            None => Ok(None),
        }
    }

    /// Removes a document and its chunks from every store. Returns `false`
    /// when the file was not indexed.
    pub async fn delete_document(&self, case: &CaseId, file_name: &str) -> Result<bool, CoreError> {
        validate_file_name(file_name)?;
        let Some(chunk_ids) = self.documents.delete_document(case, file_name).await? else {
            return Ok(false);
        };

        self.vectors.delete_chunks(case, &chunk_ids).await?;

        let upload = self.layout.upload_path(case, file_name)?;
        if tokio::fs::try_exists(&upload).await? {
            tokio::fs::remove_file(&upload).await?;
        }

        self.lexical.invalidate(case);
        info!(case = %case, file = %file_name, removed = chunk_ids.len(), "document deleted");
        Ok(true)
    }
}

//! Per-case document index and raw chunk text store.
//!
//! `document_index.json` maps each file to its chunk ids and each chunk id to
//! its provenance; the verbatim chunk text lives under `raw_text/<id>.txt`.
//! This store is the ground truth the citation validator checks client
//! excerpts against, so writes are atomic (temp file + rename) and chunk
//! text is never rewritten after indexing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::paths::{CaseId, CaseLayout, validate_file_name};
use crate::types::{ChunkProvenance, Clock, CoreError, DocumentInfo, EvidenceChunk};

const PREVIEW_CHARS: usize = 100;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    documents: BTreeMap<String, DocumentEntry>,
    chunks: BTreeMap<String, ChunkEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct DocumentEntry {
    file_name: String,
    chunk_count: usize,
    chunk_ids: Vec<String>,
    ocr_applied: bool,
    indexed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChunkEntry {
    provenance: ChunkProvenance,
    text_preview: String,
}

/// Filesystem-backed index of every chunk in a case.
#[derive(Clone)]
pub struct DocumentIndex {
    layout: CaseLayout,
    clock: Arc<dyn Clock>,
}

impl DocumentIndex {
    pub fn new(layout: CaseLayout, clock: Arc<dyn Clock>) -> Self {
        Self { layout, clock }
    }

    /// Records a document's chunks: provenance into the index, verbatim text
    /// into `raw_text/`. Replaces any previous entry for the same file name.
    pub async fn index_document(
        &self,
        case: &CaseId,
        file_name: &str,
        chunks: &[EvidenceChunk],
    ) -> Result<DocumentInfo, CoreError> {
        validate_file_name(file_name)?;
        self.layout.ensure_case(case).await?;

        let raw_dir = self.layout.raw_text_dir(case);
        fs::create_dir_all(&raw_dir).await?;

        let mut index = self.load(case).await?;

        // Re-uploading a file replaces its chunks wholesale.
        if let Some(previous) = index.documents.remove(file_name) {
            for chunk_id in &previous.chunk_ids {
                index.chunks.remove(chunk_id);
                let _ = fs::remove_file(raw_dir.join(format!("{chunk_id}.txt"))).await;
            }
        }

        let ocr_applied = chunks.iter().any(|c| c.provenance.ocr);
        let indexed_at = self.clock.now();
        let mut chunk_ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let chunk_id = chunk.provenance.chunk_id.clone();
            fs::write(raw_dir.join(format!("{chunk_id}.txt")), &chunk.text).await?;
            index.chunks.insert(
                chunk_id.clone(),
                ChunkEntry {
                    provenance: chunk.provenance.clone(),
                    text_preview: preview(&chunk.text),
                },
            );
            chunk_ids.push(chunk_id);
        }

        index.documents.insert(
            file_name.to_string(),
            DocumentEntry {
                file_name: file_name.to_string(),
                chunk_count: chunks.len(),
                chunk_ids,
                ocr_applied,
                indexed_at,
            },
        );

        self.save(case, &index).await?;

        Ok(DocumentInfo {
            file_name: file_name.to_string(),
            chunk_count: chunks.len(),
            ocr_applied,
            indexed_at,
        })
    }

    /// Verbatim text stored for a chunk id. Ids that are not safe path
    /// segments (possible with model-invented citation ids) resolve to `None`.
    pub async fn chunk_text(
        &self,
        case: &CaseId,
        chunk_id: &str,
    ) -> Result<Option<String>, CoreError> {
        if validate_file_name(chunk_id).is_err() {
            return Ok(None);
        }
        let path = self
            .layout
            .raw_text_dir(case)
            .join(format!("{chunk_id}.txt"));
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path).await?))
    }

    pub async fn chunk_provenance(
        &self,
        case: &CaseId,
        chunk_id: &str,
    ) -> Result<Option<ChunkProvenance>, CoreError> {
        let index = self.load(case).await?;
        Ok(index
            .chunks
            .get(chunk_id)
            .map(|entry| entry.provenance.clone()))
    }

    /// Full chunks for a list of ids; ids without stored provenance or text
    /// are silently skipped.
    pub async fn chunks_by_ids(
        &self,
        case: &CaseId,
        chunk_ids: &[String],
    ) -> Result<Vec<EvidenceChunk>, CoreError> {
        let index = self.load(case).await?;
        let mut chunks = Vec::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            let Some(entry) = index.chunks.get(chunk_id) else {
                continue;
            };
            let Some(text) = self.chunk_text(case, chunk_id).await? else {
                continue;
            };
            chunks.push(EvidenceChunk {
                text,
                provenance: entry.provenance.clone(),
            });
        }
        Ok(chunks)
    }

    pub async fn all_chunk_ids(&self, case: &CaseId) -> Result<Vec<String>, CoreError> {
        let index = self.load(case).await?;
        Ok(index.chunks.keys().cloned().collect())
    }

    /// Concatenated text for a file, optionally restricted to one page.
    /// Returns `None` when the file is not indexed or no chunk matches.
    pub async fn raw_text(
        &self,
        case: &CaseId,
        file_name: &str,
        page_num: Option<u32>,
    ) -> Result<Option<String>, CoreError> {
        let index = self.load(case).await?;
        let Some(doc) = index.documents.get(file_name) else {
            return Ok(None);
        };

        let mut texts = Vec::new();
        for chunk_id in &doc.chunk_ids {
            let Some(entry) = index.chunks.get(chunk_id) else {
                continue;
            };
            if page_num.is_some() && entry.provenance.page_num != page_num {
                continue;
            }
            if let Some(text) = self.chunk_text(case, chunk_id).await? {
                texts.push(text);
            }
        }

        if texts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(texts.join("\n\n")))
        }
    }

    pub async fn list_documents(&self, case: &CaseId) -> Result<Vec<DocumentInfo>, CoreError> {
        let index = self.load(case).await?;
        Ok(index
            .documents
            .values()
            .map(|doc| DocumentInfo {
                file_name: doc.file_name.clone(),
                chunk_count: doc.chunk_count,
                ocr_applied: doc.ocr_applied,
                indexed_at: doc.indexed_at,
            })
            .collect())
    }

    pub async fn has_document(&self, case: &CaseId, file_name: &str) -> Result<bool, CoreError> {
        let index = self.load(case).await?;
        Ok(index.documents.contains_key(file_name))
    }

    /// Removes a document, its chunk entries, and its raw text files.
    /// Returns the removed chunk ids, or `None` when the file was not indexed.
    pub async fn delete_document(
        &self,
        case: &CaseId,
        file_name: &str,
    ) -> Result<Option<Vec<String>>, CoreError> {
        let mut index = self.load(case).await?;
        let Some(doc) = index.documents.remove(file_name) else {
            return Ok(None);
        };

        let raw_dir = self.layout.raw_text_dir(case);
        for chunk_id in &doc.chunk_ids {
            index.chunks.remove(chunk_id);
            let _ = fs::remove_file(raw_dir.join(format!("{chunk_id}.txt"))).await;
        }

        self.save(case, &index).await?;
        Ok(Some(doc.chunk_ids))
    }

    async fn load(&self, case: &CaseId) -> Result<IndexFile, CoreError> {
        let path = self.layout.document_index_path(case);
        if !fs::try_exists(&path).await? {
            return Ok(IndexFile::default());
        }
        let raw = fs::read_to_string(&path).await?;
        match serde_json::from_str(&raw) {
            Ok(index) => Ok(index),
            Err(err) => {
                warn!(case = %case, error = %err, "corrupt document index, starting fresh");
                Ok(IndexFile::default())
            }
        }
    }

    async fn save(&self, case: &CaseId, index: &IndexFile) -> Result<(), CoreError> {
        let path = self.layout.document_index_path(case);
        write_json_atomic(&path, index).await
    }
}

/// Serializes `value` to `path` via a sibling temp file and rename, so
/// readers never observe a partially written document.
pub(crate) async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), CoreError> {
    let serialized = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serialized).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let prefix: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{prefix}...")
    } else {
        text.to_string()
    }
}

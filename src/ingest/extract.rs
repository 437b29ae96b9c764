//! Extraction contracts between the chunking pipeline and file formats.
//!
//! Format parsers live behind [`DocumentExtractor`]: paginated sources yield
//! per-page text, flow sources yield numbered paragraphs. OCR is a separate
//! capability ([`OcrEngine`]) so the pipeline can decide when to invoke it
//! from the extraction yield alone.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::types::CoreError;

/// One page of extracted text; `page` is 1-indexed.
#[derive(Clone, Debug)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// One paragraph of a flow document; `index` is 1-indexed over the source's
/// paragraph sequence, empties included in the numbering.
#[derive(Clone, Debug)]
pub struct Paragraph {
    pub index: u32,
    pub text: String,
}

/// Raw extraction output, before chunking.
#[derive(Clone, Debug)]
pub enum RawDocument {
    Paged(Vec<PageText>),
    Flow(Vec<Paragraph>),
}

impl RawDocument {
    /// Average extracted characters per page. `None` for flow documents and
    /// zero-page extractions.
    pub fn chars_per_page(&self) -> Option<f64> {
        match self {
            RawDocument::Paged(pages) => {
                if pages.is_empty() {
                    return None;
                }
                let total: usize = pages.iter().map(|p| p.text.trim().len()).sum();
                Some(total as f64 / pages.len() as f64)
            }
            RawDocument::Flow(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawDocument::Paged(pages) => pages.iter().all(|p| p.text.trim().is_empty()),
            RawDocument::Flow(paragraphs) => {
                paragraphs.iter().all(|p| p.text.trim().is_empty())
            }
        }
    }
}

/// Turns a source file into raw per-unit text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Whether this extractor handles the (lowercased, dot-free) extension.
    fn supports(&self, extension: &str) -> bool;

    async fn extract(&self, path: &Path) -> Result<RawDocument, CoreError>;
}

/// Produces a searchable copy of a scanned document.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Returns the path of the searchable output (which may be the input
    /// itself when nothing needed OCR).
    async fn make_searchable(&self, input: &Path) -> Result<PathBuf, CoreError>;
}

/// [`OcrEngine`] backed by the `ocrmypdf` CLI.
#[derive(Clone, Debug)]
pub struct OcrMyPdf {
    timeout: Duration,
}

impl OcrMyPdf {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for OcrMyPdf {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    async fn make_searchable(&self, input: &Path) -> Result<PathBuf, CoreError> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::Ocr("input has no file name".to_string()))?;
        let output = input.with_file_name(format!("{stem}_ocr.pdf"));

        let run = Command::new("ocrmypdf")
            .arg("--skip-text")
            .arg("--optimize")
            .arg("1")
            .arg(input)
            .arg(&output)
            .output();

        let result = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CoreError::Ocr("OCR timed out".to_string()))?;

        let result = match result {
            Ok(output) => output,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::Ocr(
                    "ocrmypdf not installed; install tesseract, ghostscript and ocrmypdf"
                        .to_string(),
                ));
            }
            Err(err) => return Err(CoreError::Ocr(err.to_string())),
        };

        // Exit code 6 means the document already had a text layer.
        let code = result.status.code();
        if !result.status.success() && code != Some(6) {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CoreError::Ocr(stderr.trim().to_string()));
        }

        if tokio::fs::try_exists(&output).await? {
            Ok(output)
        } else {
            Ok(input.to_path_buf())
        }
    }
}

/// Flow extractor for plain-text formats: paragraphs are blank-line
/// separated blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "md")
    }

    async fn extract(&self, path: &Path) -> Result<RawDocument, CoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut paragraphs = Vec::new();
        for (position, block) in raw.split("\n\n").enumerate() {
            let text = block.trim();
            if text.is_empty() {
                continue;
            }
            paragraphs.push(Paragraph {
                index: position as u32 + 1,
                text: text.to_string(),
            });
        }
        Ok(RawDocument::Flow(paragraphs))
    }
}

//! Word-window chunking with provenance.
//!
//! Paginated sources chunk page by page; flow sources first group paragraphs
//! up to a soft word budget, then chunk each group. Either way a unit at or
//! under the target emits a single chunk, and longer units are split with a
//! sliding word window.

use uuid::Uuid;

use crate::ingest::extract::{Paragraph, RawDocument};
use crate::types::{ChunkProvenance, EvidenceChunk};

/// Knobs for the window and the flow grouping budget.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingOptions {
    pub target_words: usize,
    pub overlap_words: usize,
    pub flow_group_words: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            target_words: 500,
            overlap_words: 80,
            flow_group_words: 600,
        }
    }
}

/// Fresh chunk id: a v4 uuid truncated to 8 hex chars, unique within a case
/// for any realistic corpus size.
fn fresh_chunk_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Splits one extraction unit into overlapping chunks.
///
/// `char_start`/`char_end` track positions with the window's approximate
/// advance; they are recorded as hints only.
pub fn chunk_unit(
    text: &str,
    file_name: &str,
    page_num: Option<u32>,
    para_idx: Option<u32>,
    ocr: bool,
    options: &ChunkingOptions,
) -> Vec<EvidenceChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let provenance = |chunk_id: String, char_start: usize, char_end: usize| ChunkProvenance {
        chunk_id,
        file_name: file_name.to_string(),
        page_num,
        para_idx,
        char_start,
        char_end,
        ocr,
    };

    if words.len() <= options.target_words {
        let trimmed = text.trim().to_string();
        let char_end = text.len();
        return vec![EvidenceChunk {
            text: trimmed,
            provenance: provenance(fresh_chunk_id(), 0, char_end),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut char_pos = 0usize;

    while start < words.len() {
        let end = (start + options.target_words).min(words.len());
        let chunk_text = words[start..end].join(" ");
        let char_start = char_pos;
        let char_end = char_start + chunk_text.len();

        chunks.push(EvidenceChunk {
            text: chunk_text,
            provenance: provenance(fresh_chunk_id(), char_start, char_end),
        });

        start = if end < words.len() {
            end - options.overlap_words
        } else {
            words.len()
        };
        char_pos = char_end.saturating_sub(options.overlap_words * 6);
    }

    chunks
}

/// Chunks a whole extracted document according to its format policy.
pub fn chunk_document(
    raw: &RawDocument,
    file_name: &str,
    ocr: bool,
    options: &ChunkingOptions,
) -> Vec<EvidenceChunk> {
    match raw {
        RawDocument::Paged(pages) => {
            let mut chunks = Vec::new();
            for page in pages {
                if page.text.trim().is_empty() {
                    continue;
                }
                chunks.extend(chunk_unit(
                    &page.text,
                    file_name,
                    Some(page.page),
                    None,
                    ocr,
                    options,
                ));
            }
            chunks
        }
        RawDocument::Flow(paragraphs) => {
            let mut chunks = Vec::new();
            for group in group_paragraphs(paragraphs, options.flow_group_words) {
                chunks.extend(chunk_unit(
                    &group.text,
                    file_name,
                    None,
                    Some(group.first_para),
                    ocr,
                    options,
                ));
            }
            chunks
        }
    }
}

struct ParagraphGroup {
    first_para: u32,
    text: String,
}

/// Accumulates consecutive paragraphs until adding the next would exceed the
/// word budget; each group keeps the index of its first paragraph.
fn group_paragraphs(paragraphs: &[Paragraph], budget_words: usize) -> Vec<ParagraphGroup> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut first_para = 0u32;

    for paragraph in paragraphs {
        let text = paragraph.text.trim();
        if text.is_empty() {
            continue;
        }

        if current.is_empty() {
            current = text.to_string();
            first_para = paragraph.index;
            continue;
        }

        let combined_words = current.split_whitespace().count() + text.split_whitespace().count();
        if combined_words > budget_words {
            groups.push(ParagraphGroup {
                first_para,
                text: std::mem::take(&mut current),
            });
            current = text.to_string();
            first_para = paragraph.index;
        } else {
            current.push_str("\n\n");
            current.push_str(text);
        }
    }

    if !current.trim().is_empty() {
        groups.push(ParagraphGroup {
            first_para,
            text: current,
        });
    }

    groups
}

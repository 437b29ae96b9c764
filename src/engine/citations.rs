//! Citation marker extraction from generated answers.
//!
//! Two syntaxes, matched with straight or curly quotes:
//! `[Source: file.pdf, page 3] "quoted"` for client documents and
//! `[Source: https://...] "quoted"` for legal sources. A legal marker is
//! resolved to a snapshot id only among the snapshots that were actually
//! offered to the model; an unmatched URL leaves the id empty so the
//! validator rejects it.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Citation, Snapshot, SourceKind};

fn client_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\[Source:\s*([^\],]+?)(?:,\s*page\s*(\d+))?\]\s*["“”]([^"“”]+)["“”]"#)
            .unwrap()
    })
}

fn legal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\[Source:\s*(https?://[^\]]+)\]\s*["“”]([^"“”]+)["“”]"#).unwrap()
    })
}

pub(crate) fn parse_citations(answer: &str, legal_sources: &[Snapshot]) -> Vec<Citation> {
    let mut citations = Vec::new();

    for capture in client_pattern().captures_iter(answer) {
        let locator = capture[1].trim().to_string();
        // URL locators belong to the legal pattern below.
        if locator.starts_with("http://") || locator.starts_with("https://") {
            continue;
        }
        let page_num = capture
            .get(2)
            .and_then(|page| page.as_str().parse::<u32>().ok());
        let excerpt = capture[3].trim().to_string();

        citations.push(Citation {
            id: format!("{}_{}", locator, page_num.unwrap_or(0)),
            source: SourceKind::Client,
            url: None,
            file_name: Some(locator),
            page_num,
            excerpt,
        });
    }

    for capture in legal_pattern().captures_iter(answer) {
        let url = capture[1].trim().to_string();
        let excerpt = capture[2].trim().to_string();

        let id = legal_sources
            .iter()
            .find(|source| source.url == url)
            .map(|source| source.id.clone())
            .unwrap_or_default();

        citations.push(Citation {
            id,
            source: SourceKind::Legal,
            url: Some(url),
            file_name: None,
            page_num: None,
            excerpt,
        });
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(id: &str, url: &str) -> Snapshot {
        Snapshot {
            id: id.into(),
            url: url.into(),
            domain: "www.gov.uk".into(),
            title: String::new(),
            excerpt: String::new(),
            text: String::new(),
            html: String::new(),
            content_hash: String::new(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn parses_client_citation_with_and_without_page() {
        let answer = r#"The start date was March. [Source: contract.pdf, page 2] "employment began on 15 March 2023"
            Also noted elsewhere. [Source: letter.docx] "resignation tendered in June""#;

        let citations = parse_citations(answer, &[]);
        assert_eq!(citations.len(), 2);

        assert_eq!(citations[0].source, SourceKind::Client);
        assert_eq!(citations[0].file_name.as_deref(), Some("contract.pdf"));
        assert_eq!(citations[0].page_num, Some(2));
        assert_eq!(citations[0].excerpt, "employment began on 15 March 2023");
        assert_eq!(citations[0].id, "contract.pdf_2");

        assert_eq!(citations[1].file_name.as_deref(), Some("letter.docx"));
        assert_eq!(citations[1].page_num, None);
        assert_eq!(citations[1].id, "letter.docx_0");
    }

    #[test]
    fn parses_legal_citation_and_resolves_snapshot_id() {
        let sources = vec![snapshot("abcd1234abcd1234", "https://www.gov.uk/notice-periods")];
        let answer = r#"[Source: https://www.gov.uk/notice-periods] "one week per year of service""#;

        let citations = parse_citations(answer, &sources);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, SourceKind::Legal);
        assert_eq!(citations[0].id, "abcd1234abcd1234");
        assert_eq!(
            citations[0].url.as_deref(),
            Some("https://www.gov.uk/notice-periods")
        );
    }

    #[test]
    fn url_citations_are_not_double_parsed_as_client() {
        let sources = vec![snapshot("abcd1234abcd1234", "https://www.gov.uk/notice-periods")];
        let answer = r#"[Source: https://www.gov.uk/notice-periods] "one week per year""#;

        let citations = parse_citations(answer, &sources);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source, SourceKind::Legal);
    }

    #[test]
    fn unknown_url_yields_empty_snapshot_id() {
        let sources = vec![snapshot("abcd1234abcd1234", "https://www.gov.uk/real-page")];
        let answer = r#"[Source: https://www.gov.uk/invented-page] "fabricated quote here""#;

        let citations = parse_citations(answer, &sources);
        assert_eq!(citations.len(), 1);
        assert!(citations[0].id.is_empty());
    }

    #[test]
    fn curly_quotes_are_accepted() {
        let answer = "[Source: memo.docx] “the meeting was recorded”";
        let citations = parse_citations(answer, &[]);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].excerpt, "the meeting was recorded");
    }

    #[test]
    fn answers_without_markers_parse_to_nothing() {
        assert!(parse_citations("No citations here at all.", &[]).is_empty());
    }
}

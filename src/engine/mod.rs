//! Two-phase grounded answering with bounded retry.
//!
//! Phase A retrieves: session context, hybrid search over the case, and —
//! when the question smells legal — snapshots from the whitelisted sites.
//! Phase B generates under a source-constrained prompt, parses citation
//! markers, validates every one, and retries with a stricter prompt on
//! verifiable failure. The engine never errors on citation problems; it
//! always returns an answer and reports validity alongside it.

pub mod citations;
pub mod prompt;
pub mod validator;

use std::sync::Arc;

use tracing::{info, warn};

use crate::completion::ChatModel;
use crate::legal::{LegalSearch, Whitelist};
use crate::paths::CaseId;
use crate::retrieval::{HybridRetriever, SearchOptions};
use crate::session::SessionContext;
use crate::types::{AnswerOutcome, Citation, CoreError, SearchResult, Snapshot};

pub use validator::{CitationCheck, CitationValidator};

/// Client chunks retrieved per question.
const ANSWER_TOP_K: usize = 8;
/// Evidence texts carried into the session per successful turn.
const SESSION_FACTS: usize = 5;
/// Substrings that mark a question as needing legal sources.
const LEGAL_KEYWORDS: &[&str] = &[
    "law",
    "legal",
    "regulation",
    "rule",
    "act",
    "statute",
    "immigration",
    "visa",
    "tribunal",
    "court",
    "judgment",
];

const UNVERIFIED_SUFFIX: &str = "\n\n⚠️ Warning: Some citations could not be verified.";

/// Engine knobs taken from [`crate::config::Settings`].
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    pub temperature: f64,
    pub max_citation_retries: usize,
    pub max_legal_sources: usize,
}

pub struct AnswerEngine {
    retriever: Arc<HybridRetriever>,
    legal_search: Arc<LegalSearch>,
    sessions: Arc<dyn SessionContext>,
    chat: Arc<dyn ChatModel>,
    validator: Arc<CitationValidator>,
    whitelist: Whitelist,
    options: EngineOptions,
}

impl AnswerEngine {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        legal_search: Arc<LegalSearch>,
        sessions: Arc<dyn SessionContext>,
        chat: Arc<dyn ChatModel>,
        validator: Arc<CitationValidator>,
        whitelist: Whitelist,
        options: EngineOptions,
    ) -> Self {
        Self {
            retriever,
            legal_search,
            sessions,
            chat,
            validator,
            whitelist,
            options,
        }
    }

    /// Answers a question about a case with validated citations.
    pub async fn answer(
        &self,
        case: &CaseId,
        question: &str,
        include_legal_sources: bool,
    ) -> Result<AnswerOutcome, CoreError> {
        // Phase A: retrieval.
        let session_context = self.sessions.context_for(case).await;
        let client_evidence = self
            .retriever
            .search(
                case,
                question,
                SearchOptions {
                    top_k: Some(ANSWER_TOP_K),
                    ..SearchOptions::default()
                },
            )
            .await?;

        let legal_sources = if include_legal_sources && wants_legal_sources(question) {
            self.legal_search
                .sources_for_query(question, self.options.max_legal_sources)
                .await?
        } else {
            Vec::new()
        };
        info!(case = %case, evidence = client_evidence.len(), legal = legal_sources.len(),
            "retrieval complete");

        // Phase B: generation with validation loop.
        let base_prompt = prompt::system_prompt(
            &client_evidence,
            &legal_sources,
            &session_context,
            &self.whitelist,
        );
        let evidence_present = !client_evidence.is_empty() || !legal_sources.is_empty();

        let mut validation_errors: Vec<String> = Vec::new();
        let mut last_answer = String::new();
        let mut last_citations: Vec<Citation> = Vec::new();

        for attempt in 0..=self.options.max_citation_retries {
            let current_prompt = if attempt == 0 || validation_errors.is_empty() {
                base_prompt.clone()
            } else {
                prompt::stricter_prompt(&base_prompt, &validation_errors)
            };

            let answer = self
                .chat
                .complete(&current_prompt, question, self.options.temperature)
                .await?;
            let citations = citations::parse_citations(&answer, &legal_sources);

            let (all_valid, errors) = if evidence_present && citations.is_empty() {
                (
                    false,
                    vec!["No citations found despite available evidence.".to_string()],
                )
            } else {
                self.validator.all_valid(case, &citations).await?
            };

            if all_valid {
                self.update_session(case, &client_evidence, &legal_sources)
                    .await;
                return Ok(AnswerOutcome {
                    answer,
                    client_evidence,
                    legal_sources,
                    citations,
                    citations_valid: true,
                    validation_errors: Vec::new(),
                });
            }

            warn!(case = %case, attempt = attempt + 1, errors = ?errors,
                "citation validation failed");
            validation_errors = errors;
            last_answer = answer;
            last_citations = citations;
        }

        // Retries exhausted: return the last answer, flagged, never dropped.
        Ok(AnswerOutcome {
            answer: format!("{last_answer}{UNVERIFIED_SUFFIX}"),
            client_evidence,
            legal_sources,
            citations: last_citations,
            citations_valid: false,
            validation_errors,
        })
    }

    async fn update_session(
        &self,
        case: &CaseId,
        client_evidence: &[SearchResult],
        legal_sources: &[Snapshot],
    ) {
        let facts: Vec<String> = client_evidence
            .iter()
            .take(SESSION_FACTS)
            .map(|result| result.text.clone())
            .collect();
        let legal_ids: Vec<String> = legal_sources.iter().map(|s| s.id.clone()).collect();

        if let Err(err) = self.sessions.record_turn(case, facts, legal_ids).await {
            warn!(case = %case, error = %err, "session update failed");
        }
    }
}

fn wants_legal_sources(question: &str) -> bool {
    let lowered = question.to_lowercase();
    LEGAL_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_gate_is_case_insensitive_substring() {
        assert!(wants_legal_sources("What does the LAW say here?"));
        assert!(wants_legal_sources("Is there a tribunal deadline?"));
        // "act" matches inside "contract" — substring matching is the rule.
        assert!(wants_legal_sources("What does the contract say?"));
        assert!(!wants_legal_sources("When did the client start work?"));
    }
}

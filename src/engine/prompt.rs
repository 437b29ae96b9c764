//! Grounded system prompt construction.
//!
//! The prompt enumerates exactly the sources the model may cite and nothing
//! else; the validator later holds the model to them. Retries prepend the
//! prior attempt's errors without touching the sources block.

use crate::legal::Whitelist;
use crate::types::{SearchResult, Snapshot};

/// Most snapshot text offered to the model per legal source.
const SNAPSHOT_PROMPT_CHARS: usize = 3000;

pub(crate) fn system_prompt(
    client_evidence: &[SearchResult],
    legal_sources: &[Snapshot],
    session_context: &str,
    whitelist: &Whitelist,
) -> String {
    let mut prompt = String::from(
        "You are a legal assistant helping with case analysis. You MUST follow these rules:\n\
         \n\
         CRITICAL RULES:\n\
         1. You may ONLY cite from the sources provided below.\n\
         2. Every factual claim MUST include a citation with a quoted excerpt.\n\
         3. If information is not in the provided sources, say \"This information does not appear in the current case documents.\"\n\
         4. NEVER make up or hallucinate citations.\n\
         5. NEVER cite sources not listed below.\n\
         \n\
         CITATION FORMAT:\n\
         For client documents:\n\
         - Use: [Source: filename.pdf, page X] \"quoted text\"\n\
         \n\
         For legal sources:\n\
         - Use: [Source: URL] \"quoted text\"\n\n",
    );

    if !session_context.is_empty() {
        prompt.push_str("CASE CONTEXT (from previous analysis):\n");
        prompt.push_str(session_context);
        prompt.push_str("\n\n");
    }

    let divider = "=".repeat(50);

    if !client_evidence.is_empty() {
        prompt.push_str("CLIENT DOCUMENTS (you may cite from these):\n");
        prompt.push_str(&divider);
        prompt.push('\n');
        for (position, result) in client_evidence.iter().enumerate() {
            prompt.push_str(&format!(
                "\n[{}] File: {}, {}\nContent:\n{}\n",
                position + 1,
                result.provenance.file_name,
                result.provenance.locator(),
                result.text,
            ));
        }
        prompt.push_str(&divider);
        prompt.push_str("\n\n");
    }

    if !legal_sources.is_empty() {
        prompt.push_str("LEGAL SOURCES (you may cite from these WHITELISTED domains only):\n");
        prompt.push_str(&format!(
            "Allowed domains: {}\n",
            whitelist.domains().join(", ")
        ));
        prompt.push_str(&divider);
        prompt.push('\n');
        for (position, source) in legal_sources.iter().enumerate() {
            prompt.push_str(&format!(
                "\n[L{}] URL: {}\nTitle: {}\nContent:\n{}\n",
                position + 1,
                source.url,
                source.title,
                clip(&source.text, SNAPSHOT_PROMPT_CHARS),
            ));
        }
        prompt.push_str(&divider);
        prompt.push('\n');
    }

    prompt
}

/// Retry prompt: the prior errors up front, the unchanged sources block
/// after.
pub(crate) fn stricter_prompt(base_prompt: &str, validation_errors: &[String]) -> String {
    let error_list = validation_errors
        .iter()
        .map(|err| format!("- {err}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "IMPORTANT: Your previous response had citation errors that MUST be fixed:\n\
         {error_list}\n\
         \n\
         REMINDER:\n\
         - ONLY quote text that EXACTLY appears in the sources provided\n\
         - If you cannot find a supporting quote, DO NOT cite that source\n\
         - It is better to say \"insufficient information\" than to cite incorrectly\n\
         \n\
         {base_prompt}"
    )
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{prefix}...")
    } else {
        text.to_string()
    }
}

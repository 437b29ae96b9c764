//! Runtime configuration.
//!
//! [`Settings`] carries every knob the pipeline recognizes: storage
//! directories, provider endpoint and model names, the citation whitelist,
//! and the chunking/retrieval/retry parameters. Values come from compiled
//! defaults, overridden by `CITESMITH_*` environment variables (a `.env`
//! file is honored via dotenvy), overridden again by the builder setters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::CoreError;

/// Domains a citation may come from, in configuration order. A URL host
/// matches an entry when it is equal to it or ends with `"." + entry`.
pub const DEFAULT_WHITELIST: &[&str] = &["acas.org.uk", "gov.uk", "citizensadvice.org.uk"];

#[derive(Clone, Debug)]
pub struct Settings {
    /// Root directory holding one subdirectory per case.
    pub cases_dir: PathBuf,
    /// Root of the global (cross-case) legal snapshot cache.
    pub legal_cache_dir: PathBuf,
    /// SQLite file backing the vector store.
    pub vector_db_path: PathBuf,

    /// OpenAI-compatible endpoint base URL.
    pub provider_base_url: String,
    /// API key for the provider; `None` means the environment did not supply one.
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub llm_model: String,
    /// Sampling temperature for answer generation.
    pub temperature: f64,

    pub whitelist_domains: Vec<String>,

    /// Minimum extracted chars per page before a paginated document is
    /// considered scanned and routed through OCR.
    pub ocr_text_threshold: usize,
    pub chunk_target_words: usize,
    pub chunk_overlap_words: usize,
    /// Soft word budget when grouping flow paragraphs into chunking units.
    pub flow_group_words: usize,

    pub hybrid_search_top_k: usize,
    pub max_chunks_per_doc: usize,
    pub dedupe_similarity_threshold: f32,
    pub max_citation_retries: usize,
    /// Upper bound on snapshots gathered per question by the search helper.
    pub max_legal_sources: usize,

    pub fetch_timeout: Duration,
    pub ocr_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cases_dir: PathBuf::from("storage/cases"),
            legal_cache_dir: PathBuf::from("storage/legal_cache"),
            vector_db_path: PathBuf::from("storage/evidence.sqlite"),
            provider_base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            llm_model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            whitelist_domains: DEFAULT_WHITELIST.iter().map(|d| d.to_string()).collect(),
            ocr_text_threshold: 100,
            chunk_target_words: 500,
            chunk_overlap_words: 80,
            flow_group_words: 600,
            hybrid_search_top_k: 10,
            max_chunks_per_doc: 3,
            dedupe_similarity_threshold: 0.9,
            max_citation_retries: 2,
            max_legal_sources: 5,
            fetch_timeout: Duration::from_secs(15),
            ocr_timeout: Duration::from_secs(300),
        }
    }
}

impl Settings {
    /// Builds settings from the environment, falling back to defaults for
    /// anything unset. Loads `.env` once if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            cases_dir: env_path("CITESMITH_CASES_DIR", defaults.cases_dir),
            legal_cache_dir: env_path("CITESMITH_LEGAL_CACHE_DIR", defaults.legal_cache_dir),
            vector_db_path: env_path("CITESMITH_VECTOR_DB", defaults.vector_db_path),
            provider_base_url: env_string("CITESMITH_BASE_URL", defaults.provider_base_url),
            api_key: std::env::var("CITESMITH_API_KEY").ok(),
            embedding_model: env_string("CITESMITH_EMBEDDING_MODEL", defaults.embedding_model),
            embedding_dimension: env_parse(
                "CITESMITH_EMBEDDING_DIMENSION",
                defaults.embedding_dimension,
            ),
            llm_model: env_string("CITESMITH_LLM_MODEL", defaults.llm_model),
            temperature: env_parse("CITESMITH_TEMPERATURE", defaults.temperature),
            whitelist_domains: env_list("CITESMITH_WHITELIST", defaults.whitelist_domains),
            ocr_text_threshold: env_parse("CITESMITH_OCR_THRESHOLD", defaults.ocr_text_threshold),
            chunk_target_words: env_parse(
                "CITESMITH_CHUNK_TARGET_WORDS",
                defaults.chunk_target_words,
            ),
            chunk_overlap_words: env_parse(
                "CITESMITH_CHUNK_OVERLAP_WORDS",
                defaults.chunk_overlap_words,
            ),
            flow_group_words: defaults.flow_group_words,
            hybrid_search_top_k: env_parse("CITESMITH_TOP_K", defaults.hybrid_search_top_k),
            max_chunks_per_doc: env_parse(
                "CITESMITH_MAX_CHUNKS_PER_DOC",
                defaults.max_chunks_per_doc,
            ),
            dedupe_similarity_threshold: env_parse(
                "CITESMITH_DEDUPE_THRESHOLD",
                defaults.dedupe_similarity_threshold,
            ),
            max_citation_retries: env_parse(
                "CITESMITH_MAX_CITATION_RETRIES",
                defaults.max_citation_retries,
            ),
            max_legal_sources: defaults.max_legal_sources,
            fetch_timeout: Duration::from_secs(env_parse(
                "CITESMITH_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
            ocr_timeout: defaults.ocr_timeout,
        }
    }

    /// Creates the storage directories this configuration points at.
    pub fn ensure_directories(&self) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.cases_dir)?;
        std::fs::create_dir_all(&self.legal_cache_dir)?;
        if let Some(parent) = self.vector_db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_storage_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.cases_dir = root.join("cases");
        self.legal_cache_dir = root.join("legal_cache");
        self.vector_db_path = root.join("evidence.sqlite");
        self
    }

    #[must_use]
    pub fn with_whitelist<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, target_words: usize, overlap_words: usize) -> Self {
        self.chunk_target_words = target_words;
        self.chunk_overlap_words = overlap_words;
        self
    }

    #[must_use]
    pub fn with_max_citation_retries(mut self, retries: usize) -> Self {
        self.max_citation_retries = retries;
        self
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect(),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let settings = Settings::default();
        assert_eq!(settings.ocr_text_threshold, 100);
        assert_eq!(settings.chunk_target_words, 500);
        assert_eq!(settings.chunk_overlap_words, 80);
        assert_eq!(settings.max_chunks_per_doc, 3);
        assert_eq!(settings.max_citation_retries, 2);
        assert_eq!(settings.whitelist_domains.len(), 3);
    }

    #[test]
    fn storage_root_rewrites_all_paths() {
        let settings = Settings::default().with_storage_root("/tmp/citesmith");
        assert_eq!(settings.cases_dir, PathBuf::from("/tmp/citesmith/cases"));
        assert_eq!(
            settings.legal_cache_dir,
            PathBuf::from("/tmp/citesmith/legal_cache")
        );
        assert_eq!(
            settings.vector_db_path,
            PathBuf::from("/tmp/citesmith/evidence.sqlite")
        );
    }
}

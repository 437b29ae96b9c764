//! Top-level wiring: one [`Assistant`] owns the whole pipeline for a
//! deployment — stores, retriever, fetcher, engine — with every external
//! capability injected through the builder so tests can substitute fakes.

use std::sync::Arc;

use crate::completion::ChatModel;
use crate::config::Settings;
use crate::embeddings::EmbeddingProvider;
use crate::engine::{AnswerEngine, CitationValidator, EngineOptions};
use crate::ingest::{ChunkingOptions, DocumentExtractor, Ingestor, OcrEngine, PlainTextExtractor};
use crate::legal::{LegalSearch, LegalSourceFetcher, SearchSite, SnapshotCache, Whitelist};
use crate::paths::{CaseId, CaseLayout};
use crate::retrieval::{HybridRetriever, LexicalIndex, SearchOptions};
use crate::session::{JsonSessionStore, SessionContext};
use crate::store::{DocumentIndex, VectorBackend};
use crate::types::{
    AnswerOutcome, Clock, CoreError, DocumentInfo, SearchResult, Snapshot, SystemClock,
};

pub struct Assistant {
    settings: Settings,
    ingestor: Arc<Ingestor>,
    retriever: Arc<HybridRetriever>,
    engine: Arc<AnswerEngine>,
    fetcher: Arc<LegalSourceFetcher>,
    documents: Arc<DocumentIndex>,
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn documents(&self) -> &Arc<DocumentIndex> {
        &self.documents
    }

    pub async fn create_case(&self, case: &CaseId) -> Result<(), CoreError> {
        self.ingestor.create_case(case).await
    }

    pub async fn delete_case(&self, case: &CaseId) -> Result<(), CoreError> {
        self.ingestor.delete_case(case).await
    }

    /// Ingests one document into a case.
    pub async fn upload(
        &self,
        case: &CaseId,
        path: &std::path::Path,
    ) -> Result<DocumentInfo, CoreError> {
        self.ingestor.ingest_file(case, path).await
    }

    pub async fn delete_document(
        &self,
        case: &CaseId,
        file_name: &str,
    ) -> Result<bool, CoreError> {
        self.ingestor.delete_document(case, file_name).await
    }

    /// Hybrid evidence search over a case.
    pub async fn search(
        &self,
        case: &CaseId,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, CoreError> {
        self.retriever.search(case, query, options).await
    }

    /// Answers a question with validated citations.
    pub async fn ask(&self, case: &CaseId, question: &str) -> Result<AnswerOutcome, CoreError> {
        self.engine.answer(case, question, true).await
    }

    /// Fetches (or re-fetches) one whitelisted legal source directly.
    pub async fn fetch_legal_source(
        &self,
        url: &str,
        force_refresh: bool,
    ) -> Result<Snapshot, CoreError> {
        self.fetcher.fetch(url, force_refresh).await
    }
}

/// Builder for [`Assistant`]. Vector store, embedder, and chat model are
/// required; everything else has a production default.
#[derive(Default)]
pub struct AssistantBuilder {
    settings: Option<Settings>,
    vectors: Option<Arc<dyn VectorBackend>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    chat: Option<Arc<dyn ChatModel>>,
    sessions: Option<Arc<dyn SessionContext>>,
    extractors: Vec<Arc<dyn DocumentExtractor>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    clock: Option<Arc<dyn Clock>>,
    search_sites: Option<Vec<SearchSite>>,
}

impl AssistantBuilder {
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn with_vector_backend(mut self, vectors: Arc<dyn VectorBackend>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    #[must_use]
    pub fn with_embedding_provider(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn with_chat_model(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    #[must_use]
    pub fn with_session_store(mut self, sessions: Arc<dyn SessionContext>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Registers an extractor; the first extractor claiming an extension
    /// wins. The plain-text extractor is always appended as a fallback.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    #[must_use]
    pub fn with_ocr_engine(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the legal search site table (defaults to the whitelisted
    /// public search pages).
    #[must_use]
    pub fn with_search_sites(mut self, sites: Vec<SearchSite>) -> Self {
        self.search_sites = Some(sites);
        self
    }

    pub fn build(self) -> Result<Assistant, CoreError> {
        let settings = self.settings.unwrap_or_else(Settings::from_env);
        settings.ensure_directories()?;

        let vectors = self
            .vectors
            .ok_or_else(|| CoreError::Storage("no vector backend configured".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| CoreError::Embedding("no embedding provider configured".to_string()))?;
        let chat = self
            .chat
            .ok_or_else(|| CoreError::Completion("no chat model configured".to_string()))?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let layout = CaseLayout::new(settings.cases_dir.clone());
        let whitelist = Whitelist::new(settings.whitelist_domains.clone());

        let documents = Arc::new(DocumentIndex::new(layout.clone(), clock.clone()));
        let lexical = Arc::new(LexicalIndex::new(
            documents.clone(),
            settings.max_chunks_per_doc,
        ));
        let retriever = Arc::new(HybridRetriever::new(
            lexical.clone(),
            vectors.clone(),
            embedder.clone(),
            settings.hybrid_search_top_k,
            settings.max_chunks_per_doc,
            settings.dedupe_similarity_threshold,
        ));

        let snapshots = Arc::new(SnapshotCache::new(
            settings.legal_cache_dir.clone(),
            clock.clone(),
        ));
        let fetcher = Arc::new(LegalSourceFetcher::new(
            snapshots.clone(),
            whitelist.clone(),
            settings.fetch_timeout,
        )?);
        let legal_search = Arc::new(match self.search_sites {
            Some(sites) => LegalSearch::with_sites(fetcher.clone(), sites),
            None => LegalSearch::new(fetcher.clone()),
        });

        let sessions: Arc<dyn SessionContext> = self.sessions.unwrap_or_else(|| {
            Arc::new(JsonSessionStore::new(layout.clone(), clock.clone()))
        });

        let validator = Arc::new(CitationValidator::new(
            documents.clone(),
            snapshots,
            whitelist.clone(),
        ));

        let engine = Arc::new(AnswerEngine::new(
            retriever.clone(),
            legal_search,
            sessions,
            chat,
            validator,
            whitelist,
            EngineOptions {
                temperature: settings.temperature,
                max_citation_retries: settings.max_citation_retries,
                max_legal_sources: settings.max_legal_sources,
            },
        ));

        let mut extractors = self.extractors;
        extractors.push(Arc::new(PlainTextExtractor));

        let ingestor = Arc::new(Ingestor::new(
            layout,
            documents.clone(),
            vectors,
            embedder,
            lexical,
            extractors,
            self.ocr,
            ChunkingOptions {
                target_words: settings.chunk_target_words,
                overlap_words: settings.chunk_overlap_words,
                flow_group_words: settings.flow_group_words,
            },
            settings.ocr_text_threshold,
        ));

        Ok(Assistant {
            settings,
            ingestor,
            retriever,
            engine,
            fetcher,
            documents,
        })
    }
}

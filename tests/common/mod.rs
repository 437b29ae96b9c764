//! Shared fixtures: an in-memory vector backend, a scripted chat model, and
//! an assistant wired for a temp directory.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tempfile::TempDir;

use citesmith::legal::SearchSite;
use citesmith::types::EvidenceChunk;
use citesmith::{
    Assistant, CaseId, ChatModel, CoreError, MockEmbeddingProvider, Settings, VectorBackend,
};

/// Installs a fmt subscriber once so `RUST_LOG` works under `cargo test`.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Brute-force cosine vector store, deterministic and dependency-free.
#[derive(Default)]
pub struct MemoryVectorStore {
    partitions: RwLock<HashMap<String, Vec<(EvidenceChunk, Vec<f32>)>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorBackend for MemoryVectorStore {
    async fn add_chunks(
        &self,
        case: &CaseId,
        chunks: Vec<(EvidenceChunk, Vec<f32>)>,
    ) -> Result<(), CoreError> {
        self.partitions
            .write()
            .entry(case.as_str().to_string())
            .or_default()
            .extend(chunks);
        Ok(())
    }

    async fn delete_chunks(
        &self,
        case: &CaseId,
        chunk_ids: &[String],
    ) -> Result<usize, CoreError> {
        let mut partitions = self.partitions.write();
        let Some(partition) = partitions.get_mut(case.as_str()) else {
            return Ok(0);
        };
        let before = partition.len();
        partition.retain(|(chunk, _)| !chunk_ids.contains(&chunk.provenance.chunk_id));
        Ok(before - partition.len())
    }

    async fn query(
        &self,
        case: &CaseId,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(EvidenceChunk, f32)>, CoreError> {
        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(case.as_str()) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<(EvidenceChunk, f32)> = partition
            .iter()
            .map(|(chunk, vector)| (chunk.clone(), cosine_distance(embedding, vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, case: &CaseId) -> Result<usize, CoreError> {
        Ok(self
            .partitions
            .read()
            .get(case.as_str())
            .map_or(0, Vec::len))
    }

    async fn drop_case(&self, case: &CaseId) -> Result<(), CoreError> {
        self.partitions.write().remove(case.as_str());
        Ok(())
    }
}

/// Chat model that replays canned responses; the last one repeats once the
/// script runs out.
pub struct ScriptedChatModel {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
        _temperature: f64,
    ) -> Result<String, CoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock();
        responses
            .get(call.min(responses.len().saturating_sub(1)))
            .cloned()
            .ok_or_else(|| CoreError::Completion("scripted model has no responses".to_string()))
    }
}

pub struct TestHarness {
    pub assistant: Assistant,
    pub chat: Arc<ScriptedChatModel>,
    pub vectors: Arc<MemoryVectorStore>,
    pub storage: TempDir,
}

/// Assistant wired against a temp directory with the deterministic fakes.
pub fn harness(
    responses: Vec<&str>,
    whitelist: Vec<String>,
    sites: Option<Vec<SearchSite>>,
) -> TestHarness {
    init_tracing();
    let storage = TempDir::new().expect("temp storage");
    let settings = Settings::default()
        .with_storage_root(storage.path())
        .with_whitelist(whitelist);

    let chat = Arc::new(ScriptedChatModel::new(responses));
    let vectors = Arc::new(MemoryVectorStore::new());

    let mut builder = Assistant::builder()
        .with_settings(settings)
        .with_vector_backend(vectors.clone())
        .with_embedding_provider(Arc::new(MockEmbeddingProvider::new(16)))
        .with_chat_model(chat.clone());
    if let Some(sites) = sites {
        builder = builder.with_search_sites(sites);
    }

    TestHarness {
        assistant: builder.build().expect("assistant builds"),
        chat,
        vectors,
        storage,
    }
}

//! Embedding provider contract and implementations.
//!
//! The pipeline only ever needs one operation: a batch of texts in, an
//! equally long, order-stable batch of fixed-dimension vectors out. Blank
//! inputs embed to the zero vector rather than being sent to a provider.

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::types::CoreError;

/// Maps text to dense vectors of a fixed dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// Embeds a batch; the output has the same length and order as the
    /// input. Blank texts yield the zero vector.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| CoreError::Embedding("provider returned an empty batch".to_string()))
    }
}

/// Deterministic provider for tests and offline runs: vectors are derived
/// from a hash of the text, so identical texts embed identically.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    vec![0.0; self.dimension]
                } else {
                    hash_to_vec(text, self.dimension)
                }
            })
            .collect())
    }
}

fn hash_to_vec(text: &str, dimension: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dimension)
        .map(|i| {
            let bits = seed.rotate_left((i * 8) as u32) ^ ((i as u64) << 24);
            (bits as f32) / u32::MAX as f32
        })
        .collect()
}

/// Adapter over a rig [`EmbeddingModel`] (e.g. an OpenAI-compatible
/// endpoint), batching at the model's document limit.
#[derive(Clone)]
pub struct RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    model: M,
    dimension: usize,
}

impl<M> RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    pub fn new(model: M, dimension: usize) -> Self {
        Self { model, dimension }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbeddingProvider<M>
where
    M: EmbeddingModel + Send + Sync,
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<(usize, String)> = Vec::new();

        for (position, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                out[position] = Some(vec![0.0; self.dimension]);
            } else {
                pending.push((position, text.clone()));
            }
        }

        for batch in pending.chunks(M::MAX_DOCUMENTS.max(1)) {
            let inputs: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let embeddings = self
                .model
                .embed_texts(inputs)
                .await
                .map_err(|err| CoreError::Embedding(err.to_string()))?;
            if embeddings.len() != batch.len() {
                return Err(CoreError::Embedding(format!(
                    "provider returned {} embeddings for {} inputs",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for ((position, _), embedding) in batch.iter().zip(embeddings) {
                out[*position] =
                    Some(embedding.vec.into_iter().map(|value| value as f32).collect());
            }
        }

        Ok(out
            .into_iter()
            .map(|vector| vector.unwrap_or_else(|| vec![0.0; self.dimension]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic() {
        let provider = MockEmbeddingProvider::new(8);
        let inputs = vec![
            "Hello world".to_string(),
            "Goodbye world".to_string(),
            "Hello world".to_string(),
        ];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], first[2]);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn blank_text_embeds_to_zero_vector() {
        let provider = MockEmbeddingProvider::new(4);
        let vectors = provider
            .embed_batch(&["   ".to_string(), String::new()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0; 4], vec![0.0; 4]]);
    }
}

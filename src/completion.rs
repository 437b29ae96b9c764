//! Chat completion contract for the answer engine.
//!
//! The engine needs exactly one operation: a system prompt, a user question,
//! and a temperature in; the assistant's text out. Model choice and endpoint
//! live with the implementation, not the engine.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};

use crate::types::CoreError;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<String, CoreError>;
}

/// Adapter over a rig [`CompletionModel`] (e.g. an OpenAI-compatible
/// endpoint resolved from configuration).
#[derive(Clone)]
pub struct RigChatModel<M>
where
    M: CompletionModel,
{
    model: M,
}

impl<M> RigChatModel<M>
where
    M: CompletionModel,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> ChatModel for RigChatModel<M>
where
    M: CompletionModel + Send + Sync,
{
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<String, CoreError> {
        let request = self
            .model
            .completion_request(rig::completion::Message::user(user.to_owned()))
            .preamble(system.to_owned())
            .temperature(temperature)
            .build();

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|err| CoreError::Completion(err.to_string()))?;

        let text = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(CoreError::Completion(
                "model returned no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

//! Model-server abstraction: chat completions and embeddings.

pub mod lmstudio;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::types::AppResult;

pub use lmstudio::LmStudioClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Incremental completion events, forwarded verbatim from the backend's
/// SSE `data:` payloads (minus the terminal sentinel).
pub type CompletionStream = BoxStream<'static, AppResult<String>>;

/// Interface to an OpenAI-compatible model server.
///
/// No retry is built in; callers decide how to handle backend failures.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Embed a single text into a fixed-dimension vector.
    async fn embed(&self, text: &str, model: Option<&str>) -> AppResult<Vec<f32>>;

    /// Embed a batch of texts in one backend call.
    async fn embed_batch(&self, texts: &[String], model: Option<&str>)
        -> AppResult<Vec<Vec<f32>>>;

    async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions)
        -> AppResult<String>;

    /// Streaming completion. The returned stream ends when the backend
    /// signals completion; an `Err` item means the upstream stream failed.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AppResult<CompletionStream>;

    /// Model identifiers advertised by the backend.
    async fn list_models(&self) -> AppResult<Vec<String>>;

    fn chat_model(&self) -> &str;

    fn embedding_model(&self) -> &str;
}

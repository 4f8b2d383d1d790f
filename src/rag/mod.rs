//! Retrieval-augmented generation: retrieve context, assemble the
//! instruct prompt, and call the chat model.

use std::sync::Arc;

use crate::embeddings::{EmbeddingService, ScoredEmbedding, SearchOptions};
use crate::llm::{ChatMessage, CompletionOptions, CompletionStream, LanguageModel};
use crate::models::ContextItem;
use crate::types::{AppError, AppResult};

pub const DEFAULT_MAX_CONTEXT_ITEMS: usize = 3;
pub const DEFAULT_RAG_THRESHOLD: f32 = 0.6;
pub const DEFAULT_RAG_MAX_TOKENS: u32 = 1500;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context to \
    answer the user's question accurately and concisely. If the context doesn't contain relevant \
    information, say so clearly.";

#[derive(Debug, Clone)]
pub struct RagOptions {
    pub max_context_items: usize,
    pub threshold: f32,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            max_context_items: DEFAULT_MAX_CONTEXT_ITEMS,
            threshold: DEFAULT_RAG_THRESHOLD,
            model: None,
            temperature: None,
            max_tokens: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub response: String,
    pub context: Vec<ContextItem>,
    pub model: String,
}

/// Context resolved up front plus the live token stream.
pub struct RagStream {
    pub context: Vec<ContextItem>,
    pub model: String,
    pub stream: CompletionStream,
}

#[derive(Clone)]
pub struct RagEngine {
    embeddings: EmbeddingService,
    llm: Arc<dyn LanguageModel>,
}

impl RagEngine {
    pub fn new(embeddings: EmbeddingService, llm: Arc<dyn LanguageModel>) -> Self {
        Self { embeddings, llm }
    }

    /// Retrieve context for `query` using the RAG retrieval defaults.
    async fn retrieve(&self, query: &str, options: &RagOptions) -> AppResult<Vec<ScoredEmbedding>> {
        let search = SearchOptions {
            limit: options.max_context_items,
            threshold: options.threshold,
            ..SearchOptions::default()
        };
        self.embeddings
            .search_similar(query, &search)
            .await
            .map_err(|e| match e {
                e @ AppError::EmbeddingBackend(_) => e,
                other => AppError::Rag(format!("context retrieval failed: {other}")),
            })
    }

    /// Assemble the single-turn instruct prompt. Context blocks are
    /// numbered so the model can cite them; an empty context set produces
    /// a plain question prompt.
    fn build_prompt(query: &str, context: &[ScoredEmbedding], options: &RagOptions) -> String {
        let system = options
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        if context.is_empty() {
            return format!("[INST] {system}\n\nQuestion: {query} [/INST]");
        }

        let blocks: Vec<String> = context
            .iter()
            .enumerate()
            .map(|(i, scored)| format!("[{}] {}", i + 1, scored.record.content))
            .collect();

        format!(
            "[INST] {system}\n\nContext:\n{}\n\nQuestion: {query} [/INST]",
            blocks.join("\n\n")
        )
    }

    fn completion_options(&self, options: &RagOptions) -> CompletionOptions {
        CompletionOptions {
            model: options.model.clone(),
            temperature: options.temperature,
            max_tokens: Some(options.max_tokens.unwrap_or(DEFAULT_RAG_MAX_TOKENS)),
        }
    }

    fn resolved_model(&self, options: &RagOptions) -> String {
        options
            .model
            .clone()
            .unwrap_or_else(|| self.llm.chat_model().to_string())
    }

    /// Retrieval only, for callers that assemble their own messages.
    pub async fn retrieve_context(
        &self,
        query: &str,
        options: &RagOptions,
    ) -> AppResult<Vec<ContextItem>> {
        let context = self.retrieve(query, options).await?;
        Ok(context.iter().map(ContextItem::from).collect())
    }

    /// Full RAG round trip: retrieve, prompt, complete.
    pub async fn answer(&self, query: &str, options: &RagOptions) -> AppResult<RagAnswer> {
        let context = self.retrieve(query, options).await?;
        let prompt = Self::build_prompt(query, &context, options);

        let response = self
            .llm
            .chat(
                &[ChatMessage::user(prompt)],
                &self.completion_options(options),
            )
            .await?;

        Ok(RagAnswer {
            response,
            context: context.iter().map(ContextItem::from).collect(),
            model: self.resolved_model(options),
        })
    }

    /// Streaming variant of [`answer`](Self::answer). Retrieval happens
    /// before the stream opens so the caller has the context up front.
    pub async fn answer_stream(&self, query: &str, options: &RagOptions) -> AppResult<RagStream> {
        let context = self.retrieve(query, options).await?;
        let prompt = Self::build_prompt(query, &context, options);

        let stream = self
            .llm
            .chat_stream(
                &[ChatMessage::user(prompt)],
                &self.completion_options(options),
            )
            .await?;

        Ok(RagStream {
            context: context.iter().map(ContextItem::from).collect(),
            model: self.resolved_model(options),
            stream,
        })
    }

    /// Plain chat without retrieval, for conversations that opt out of RAG.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AppResult<String> {
        self.llm.chat(messages, options).await
    }

    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AppResult<CompletionStream> {
        self.llm.chat_stream(messages, options).await
    }
}

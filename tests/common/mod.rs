#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;

use ragchat::auth::{AuthService, TokenManager};
use ragchat::config::{AuthConfig, Config, DatabaseConfig, LlmConfig, ServerConfig};
use ragchat::embeddings::EmbeddingService;
use ragchat::llm::{ChatMessage, CompletionOptions, CompletionStream, LanguageModel};
use ragchat::models::AppState;
use ragchat::rag::RagEngine;
use ragchat::store::memory::{MemoryEmbeddingStore, MemoryUserStore};
use ragchat::types::{AppError, AppResult};

/// Deterministic stand-in for the model server: fixed keyword vectors and
/// a canned completion.
pub struct FakeModel;

impl FakeModel {
    fn vector_for(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("rust") {
            vec![1.0, 0.0, 0.0]
        } else if lower.contains("cooking") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn embed(&self, text: &str, _model: Option<&str>) -> AppResult<Vec<f32>> {
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _model: Option<&str>,
    ) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> AppResult<String> {
        Ok("canned response".to_string())
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> AppResult<CompletionStream> {
        let chunks = vec![
            Ok(r#"{"delta":"canned "}"#.to_string()),
            Ok(r#"{"delta":"response"}"#.to_string()),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn list_models(&self) -> AppResult<Vec<String>> {
        Ok(vec!["fake-chat".to_string(), "fake-embed".to_string()])
    }

    fn chat_model(&self) -> &str {
        "fake-chat"
    }

    fn embedding_model(&self) -> &str {
        "fake-embed"
    }
}

/// Model double whose stream fails mid-completion, for exercising the
/// streaming error contract.
pub struct BrokenStreamModel;

#[async_trait]
impl LanguageModel for BrokenStreamModel {
    async fn embed(&self, _text: &str, _model: Option<&str>) -> AppResult<Vec<f32>> {
        Ok(vec![0.0, 0.0, 1.0])
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _model: Option<&str>,
    ) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0, 0.0, 1.0]).collect())
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> AppResult<String> {
        Ok("canned response".to_string())
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> AppResult<CompletionStream> {
        let chunks = vec![
            Ok(r#"{"delta":"partial"}"#.to_string()),
            Err(AppError::Rag("backend dropped connection".to_string())),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn list_models(&self) -> AppResult<Vec<String>> {
        Ok(vec!["fake-chat".to_string()])
    }

    fn chat_model(&self) -> &str {
        "fake-chat"
    }

    fn embedding_model(&self) -> &str {
        "fake-embed"
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            max_upload_bytes: 10 * 1024 * 1024,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        llm: LlmConfig {
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: "lm-studio".to_string(),
            chat_model: "fake-chat".to_string(),
            embedding_model: "fake-embed".to_string(),
            request_timeout_secs: 5,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 604_800,
            // low cost keeps the test suite fast
            bcrypt_cost: 4,
        },
    }
}

pub fn test_state() -> AppState {
    test_state_with_model(Arc::new(FakeModel))
}

pub fn test_state_with_model(llm: Arc<dyn LanguageModel>) -> AppState {
    let config = test_config();
    let user_store = Arc::new(MemoryUserStore::new());
    let embedding_store = Arc::new(MemoryEmbeddingStore::new());

    let auth = AuthService::new(
        user_store,
        TokenManager::new(&config.auth),
        config.auth.bcrypt_cost,
    );
    let embeddings = EmbeddingService::new(llm.clone(), embedding_store);
    let rag = RagEngine::new(embeddings.clone(), llm.clone());

    AppState {
        config,
        auth,
        embeddings,
        rag,
        llm,
    }
}

pub fn test_app(state: AppState) -> Router {
    ragchat::create_router(state)
}

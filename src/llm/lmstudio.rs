//! Client for an LM Studio style OpenAI-compatible model server.
//!
//! Covers `/embeddings`, `/chat/completions` (sync and `stream: true`),
//! and `/models`. Mistral-instruct quirks from the original deployment are
//! handled here: system messages are folded into `[INST]` user turns and
//! instruct stop sequences are always sent.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::types::{AppError, AppResult};

use super::{ChatMessage, CompletionOptions, CompletionStream, LanguageModel};

const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const STOP_SEQUENCES: [&str; 3] = ["</s>", "[INST]", "[/INST]"];

pub struct LmStudioClient {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: EmbeddingInput<'a>,
    model: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    stop: [&'a str; 3],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelObject>,
}

#[derive(Deserialize)]
struct ModelObject {
    id: String,
}

#[derive(Deserialize)]
struct BackendErrorResponse {
    error: BackendError,
}

#[derive(Deserialize)]
struct BackendError {
    message: String,
}

impl LmStudioClient {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    fn embedding_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::EmbeddingBackend("embedding request timed out".to_string())
        } else {
            AppError::EmbeddingBackend(format!("embedding request failed: {e}"))
        }
    }

    fn completion_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Rag("chat completion request timed out".to_string())
        } else {
            AppError::Rag(format!("chat completion request failed: {e}"))
        }
    }

    /// Extract the upstream error message from a non-2xx response body.
    async fn upstream_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<BackendErrorResponse>(&body) {
            Ok(parsed) => format!("{status}: {}", parsed.error.message),
            Err(_) => format!("{status}: {body}"),
        }
    }

    /// Mistral has no system role; fold system messages into `[INST]`
    /// user turns, as the original deployment did.
    fn format_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                if m.role == "system" {
                    ChatMessage::user(format!("[INST] {} [/INST]", m.content))
                } else {
                    m.clone()
                }
            })
            .collect()
    }

    async fn request_embeddings(
        &self,
        input: EmbeddingInput<'_>,
        model: Option<&str>,
    ) -> AppResult<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            input,
            model: model.unwrap_or(&self.embedding_model),
            encoding_format: "float",
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::embedding_error)?;

        if !response.status().is_success() {
            return Err(AppError::EmbeddingBackend(
                Self::upstream_message(response).await,
            ));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingBackend(format!("invalid embedding response: {e}")))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn chat_request<'a>(
        &'a self,
        messages: &[ChatMessage],
        options: &'a CompletionOptions,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: options.model.as_deref().unwrap_or(&self.chat_model),
            messages: Self::format_messages(messages),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            stream,
            stop: STOP_SEQUENCES,
        }
    }
}

#[async_trait]
impl LanguageModel for LmStudioClient {
    async fn embed(&self, text: &str, model: Option<&str>) -> AppResult<Vec<f32>> {
        let mut vectors = self
            .request_embeddings(EmbeddingInput::Single(text), model)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::EmbeddingBackend("backend returned no embedding".to_string()))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        model: Option<&str>,
    ) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .request_embeddings(EmbeddingInput::Batch(texts), model)
            .await?;
        if vectors.len() != texts.len() {
            return Err(AppError::EmbeddingBackend(format!(
                "backend returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AppResult<String> {
        let request = self.chat_request(messages, options, false);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::completion_error)?;

        if !response.status().is_success() {
            return Err(AppError::Rag(Self::upstream_message(response).await));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rag(format!("invalid completion response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Rag("backend returned no choices".to_string()))?;

        Ok(choice.message.content.trim().to_string())
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> AppResult<CompletionStream> {
        let request = self.chat_request(messages, options, true);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::completion_error)?;

        if !response.status().is_success() {
            return Err(AppError::Rag(Self::upstream_message(response).await));
        }

        Ok(sse_data_stream(response))
    }

    async fn list_models(&self) -> AppResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::completion_error)?;

        if !response.status().is_success() {
            return Err(AppError::Rag(Self::upstream_message(response).await));
        }

        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Rag(format!("invalid models response: {e}")))?;

        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

struct SseState {
    inner: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buf: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn an SSE response body into a stream of `data:` payloads. The
/// upstream `[DONE]` sentinel terminates the stream and is not emitted;
/// the HTTP layer writes its own terminal event.
fn sse_data_stream(response: reqwest::Response) -> CompletionStream {
    let state = SseState {
        inner: response
            .bytes_stream()
            .map(|r| r.map(|b| b.to_vec()))
            .boxed(),
        buf: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(payload) = st.pending.pop_front() {
                return Some((Ok(payload), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = st.buf.find('\n') {
                        let line: String = st.buf.drain(..=pos).collect();
                        let line = line.trim();
                        if let Some(payload) = line.strip_prefix("data:") {
                            let payload = payload.trim_start();
                            if payload == "[DONE]" {
                                st.done = true;
                                break;
                            }
                            if !payload.is_empty() {
                                st.pending.push_back(payload.to_string());
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(LmStudioClient::completion_error(e)), st));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}

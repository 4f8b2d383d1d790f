//! Chat, RAG, and embedding endpoints. Everything here sits behind
//! bearer-token auth.

use std::convert::Infallible;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use uuid::Uuid;

use crate::embeddings::{CreateOptions, SearchOptions};
use crate::llm::{ChatMessage, CompletionOptions, CompletionStream};
use crate::middleware::auth::{require_admin, require_auth};
use crate::models::{
    ApiResponse, AppState, ChatData, ChatRequest, ContextItem, ConversationRequest,
    CreateEmbeddingRequest, EmbeddingCreated, MessageResponse, ModelsData, SearchData,
    SearchRequest, UploadData,
};
use crate::rag::RagOptions;
use crate::types::{AppError, AppResult};

const ALLOWED_UPLOAD_EXTENSIONS: [&str; 4] = ["txt", "md", "json", "csv"];

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/embeddings/{id}", delete(deactivate_embedding))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/message", post(chat_message))
        .route("/message/stream", post(chat_stream))
        .route("/conversation", post(conversation))
        .route("/models", get(list_models))
        .route("/embeddings", post(create_embedding))
        .route("/embeddings/search", post(search_embeddings))
        .route("/embeddings/upload", post(upload_document))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

fn validate_message(message: &str) -> AppResult<()> {
    if message.trim().is_empty() {
        return Err(AppError::Validation("Message is required".to_string()));
    }
    Ok(())
}

fn rag_options(body: &ChatRequest) -> RagOptions {
    RagOptions {
        model: body.model.clone(),
        temperature: body.temperature,
        max_tokens: body.max_tokens,
        ..RagOptions::default()
    }
}

fn completion_options(
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> CompletionOptions {
    CompletionOptions {
        model,
        temperature,
        max_tokens,
    }
}

async fn chat_message(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<ApiResponse<ChatData>>> {
    validate_message(&body.message)?;

    let data = if body.use_rag {
        let answer = state.rag.answer(&body.message, &rag_options(&body)).await?;
        ChatData {
            response: answer.response,
            model: answer.model,
            context: Some(answer.context),
            use_rag: true,
        }
    } else {
        let options =
            completion_options(body.model.clone(), body.temperature, body.max_tokens);
        let response = state
            .rag
            .chat(&[ChatMessage::user(body.message.clone())], &options)
            .await?;
        ChatData {
            response,
            model: options
                .model
                .unwrap_or_else(|| state.llm.chat_model().to_string()),
            context: None,
            use_rag: false,
        }
    };

    Ok(Json(ApiResponse::ok(data)))
}

enum StreamPhase {
    Tokens(CompletionStream),
    Closed,
}

/// Forward backend payloads as SSE `data:` events. A clean upstream end
/// emits the `[DONE]` sentinel; an upstream failure emits one inline error
/// event and closes without the sentinel.
fn sse_response(
    stream: CompletionStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = futures::stream::unfold(StreamPhase::Tokens(stream), |phase| async move {
        match phase {
            StreamPhase::Tokens(mut inner) => match inner.next().await {
                Some(Ok(payload)) => {
                    Some((Event::default().data(payload), StreamPhase::Tokens(inner)))
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "completion stream failed");
                    let payload =
                        serde_json::json!({ "error": e.to_string() }).to_string();
                    Some((Event::default().data(payload), StreamPhase::Closed))
                }
                None => Some((Event::default().data("[DONE]"), StreamPhase::Closed)),
            },
            StreamPhase::Closed => None,
        }
    })
    .map(Ok);

    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    validate_message(&body.message)?;

    let stream = if body.use_rag {
        state
            .rag
            .answer_stream(&body.message, &rag_options(&body))
            .await?
            .stream
    } else {
        let options =
            completion_options(body.model.clone(), body.temperature, body.max_tokens);
        state
            .rag
            .chat_stream(&[ChatMessage::user(body.message.clone())], &options)
            .await?
    };

    Ok(sse_response(stream))
}

async fn conversation(
    State(state): State<AppState>,
    Json(body): Json<ConversationRequest>,
) -> AppResult<Json<ApiResponse<ChatData>>> {
    if body.messages.is_empty() {
        return Err(AppError::Validation(
            "Messages array is required".to_string(),
        ));
    }

    let mut messages = body.messages.clone();
    let mut context: Option<Vec<ContextItem>> = None;

    if body.use_rag {
        // Retrieve against the latest user turn and inject the context as
        // a leading system message.
        if let Some(last_user) = body.messages.iter().rev().find(|m| m.role == "user") {
            let answer_context = state
                .rag
                .retrieve_context(&last_user.content, &RagOptions::default())
                .await?;
            if !answer_context.is_empty() {
                let blocks: Vec<String> = answer_context
                    .iter()
                    .enumerate()
                    .map(|(i, item)| format!("[{}] {}", i + 1, item.content))
                    .collect();
                messages.insert(
                    0,
                    ChatMessage::system(format!(
                        "Use the following context when answering:\n{}",
                        blocks.join("\n\n")
                    )),
                );
            }
            context = Some(answer_context);
        }
    }

    let options = completion_options(body.model.clone(), body.temperature, body.max_tokens);
    let response = state.rag.chat(&messages, &options).await?;

    Ok(Json(ApiResponse::ok(ChatData {
        response,
        model: options
            .model
            .unwrap_or_else(|| state.llm.chat_model().to_string()),
        context,
        use_rag: body.use_rag,
    })))
}

async fn list_models(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ModelsData>>> {
    let models = state.llm.list_models().await?;
    Ok(Json(ApiResponse::ok(ModelsData { models })))
}

async fn create_embedding(
    State(state): State<AppState>,
    Json(body): Json<CreateEmbeddingRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EmbeddingCreated>>)> {
    if body.content.trim().is_empty() {
        return Err(AppError::Validation("Content is required".to_string()));
    }

    let record = state
        .embeddings
        .create(
            &body.content,
            CreateOptions {
                metadata: body.metadata,
                source: body.source,
                ..CreateOptions::default()
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(EmbeddingCreated {
            id: record.id,
            dimensions: record.dimensions,
            model: record.model_name,
        })),
    ))
}

async fn search_embeddings(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> AppResult<Json<ApiResponse<SearchData>>> {
    if body.query.trim().is_empty() {
        return Err(AppError::Validation("Query is required".to_string()));
    }

    let mut options = SearchOptions::default();
    if let Some(limit) = body.limit {
        options.limit = limit;
    }
    if let Some(threshold) = body.threshold {
        options.threshold = threshold;
    }
    options.source = body.source;

    let results: Vec<ContextItem> = state
        .embeddings
        .search_similar(&body.query, &options)
        .await?
        .iter()
        .map(ContextItem::from)
        .collect();

    Ok(Json(ApiResponse::ok(SearchData {
        count: results.len(),
        query: body.query,
        results,
    })))
}

async fn deactivate_embedding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageResponse>>> {
    if !state.embeddings.deactivate(id).await? {
        return Err(AppError::NotFound("Embedding not found".to_string()));
    }

    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Embedding deactivated".to_string(),
    })))
}

fn validate_upload(filename: &str) -> AppResult<&'static str> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| AppError::Validation("File has no extension".to_string()))?;

    let allowed = ALLOWED_UPLOAD_EXTENSIONS
        .iter()
        .find(|e| **e == extension)
        .copied();

    allowed.ok_or_else(|| {
        AppError::Validation(format!(
            "Unsupported file type '.{extension}'. Allowed: {}",
            ALLOWED_UPLOAD_EXTENSIONS.join(", ")
        ))
    })
}

async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<UploadData>>)> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::Validation("File must have a name".to_string()))?;
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
            file = Some((filename, data.to_vec()));
        }
    }

    let (filename, data) = file
        .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    validate_upload(&filename)?;

    let mime_type = mime_guess::from_path(&filename)
        .first_or_text_plain()
        .essence_str()
        .to_string();

    let file_size = data.len();
    let text = String::from_utf8(data)
        .map_err(|_| AppError::Validation("File is not valid UTF-8 text".to_string()))?;

    if text.trim().is_empty() {
        return Err(AppError::Validation("File is empty".to_string()));
    }

    let ingest = state
        .embeddings
        .process_document(&filename, &text, file_size, &mime_type)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UploadData {
            filename: ingest.filename,
            total_chunks: ingest.total_chunks,
            embeddings_created: ingest.embeddings_created,
            file_size: ingest.file_size,
        })),
    ))
}

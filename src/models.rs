// Domain models and API request/response types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::config::Config;
use crate::embeddings::EmbeddingService;
use crate::llm::{ChatMessage, LanguageModel};
use crate::rag::RagEngine;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub embeddings: EmbeddingService,
    pub rag: RagEngine,
    pub llm: Arc<dyn LanguageModel>,
}

// -------------------------------------------------------------------------
// Users

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenEntry {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Full user record. Intentionally not serializable: the password hash and
/// refresh tokens must never leave the process. Use [`UserProfile`] for
/// anything that crosses the API boundary.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub refresh_tokens: Vec<RefreshTokenEntry>,
    pub created_at: DateTime<Utc>,
}

/// Outward-facing projection of a [`User`].
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            avatar: user.avatar.clone(),
            active: user.active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Fields required to insert a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

// -------------------------------------------------------------------------
// Embeddings

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSource {
    Document,
    Message,
    Manual,
}

impl EmbeddingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingSource::Document => "document",
            EmbeddingSource::Message => "message",
            EmbeddingSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "document" => EmbeddingSource::Document,
            "message" => EmbeddingSource::Message,
            _ => EmbeddingSource::Manual,
        }
    }
}

/// A stored embedding. Invariant: `vector.len() == dimensions as usize`.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
    pub source: EmbeddingSource,
    pub source_ref: Option<Uuid>,
    pub model_name: String,
    pub dimensions: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// -------------------------------------------------------------------------
// Auth API types

#[derive(Debug, serde::Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: String,
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, serde::Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -------------------------------------------------------------------------
// Chat API types

/// Envelope shared by all chat endpoints.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub use_rag: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub use_rag: bool,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    pub response: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ContextItem>>,
    pub use_rag: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextItem {
    pub id: Uuid,
    pub content: String,
    pub similarity: f32,
    pub source: EmbeddingSource,
}

#[derive(Debug, serde::Deserialize)]
pub struct CreateEmbeddingRequest {
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub source: Option<EmbeddingSource>,
}

#[derive(Debug, serde::Serialize)]
pub struct EmbeddingCreated {
    pub id: Uuid,
    pub dimensions: i32,
    pub model: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub source: Option<EmbeddingSource>,
}

#[derive(Debug, serde::Serialize)]
pub struct SearchData {
    pub query: String,
    pub results: Vec<ContextItem>,
    pub count: usize,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub filename: String,
    pub total_chunks: usize,
    pub embeddings_created: usize,
    pub file_size: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct ModelsData {
    pub models: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

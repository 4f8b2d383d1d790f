//! Storage abstraction for users and embeddings.
//!
//! The [`UserStore`] and [`EmbeddingStore`] traits define every storage
//! operation the auth and RAG pipelines need, enabling pluggable backends:
//! Postgres in production (`crate::db`), in-memory for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{EmbeddingRecord, EmbeddingSource, NewUser, RefreshTokenEntry, User};
use crate::types::AppResult;

/// Predicate for fetching embedding candidates. Only active records are
/// ever returned; `source` and `metadata` narrow the set further.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingFilter {
    pub source: Option<EmbeddingSource>,
    /// Every key/value pair must match the record's metadata exactly.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Storage operations backing the auth/token service.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `ConflictError` if the username or
    /// email is already taken.
    async fn create_user(&self, new_user: NewUser) -> AppResult<User>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn update_last_login(&self, id: Uuid) -> AppResult<()>;

    async fn push_refresh_token(&self, id: Uuid, entry: RefreshTokenEntry) -> AppResult<()>;

    /// Atomically remove `old_token` and append `new_entry` in one step.
    /// Returns `false` if `old_token` was not present, in which case nothing
    /// is modified. Of two concurrent rotations presenting the same token,
    /// exactly one observes `true`.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AppResult<bool>;

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> AppResult<()>;

    async fn clear_refresh_tokens(&self, id: Uuid) -> AppResult<()>;

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> AppResult<()>;
}

/// Storage operations backing the embedding/RAG pipeline.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn insert(&self, record: EmbeddingRecord) -> AppResult<EmbeddingRecord>;

    /// Bulk insert; returns the number of records stored.
    async fn insert_batch(&self, records: Vec<EmbeddingRecord>) -> AppResult<usize>;

    /// Fetch all active records matching the filter, in insertion order.
    async fn find_active(&self, filter: &EmbeddingFilter) -> AppResult<Vec<EmbeddingRecord>>;

    /// Soft delete. Returns `false` if the record does not exist.
    async fn deactivate(&self, id: Uuid) -> AppResult<bool>;

    /// Hard delete all records for a source reference; returns count removed.
    async fn delete_by_source(
        &self,
        source: EmbeddingSource,
        source_ref: Uuid,
    ) -> AppResult<u64>;
}

/// Check that every filter pair matches the record metadata. Shared by the
/// in-memory store; the Postgres store pushes the same predicate into SQL
/// with `@>` containment.
pub(crate) fn metadata_matches(
    filter: &serde_json::Map<String, serde_json::Value>,
    metadata: &serde_json::Value,
) -> bool {
    filter
        .iter()
        .all(|(k, v)| metadata.get(k).map(|m| m == v).unwrap_or(false))
}

//! In-memory store implementations for tests and embedded use.
//!
//! Users live in a `HashMap` behind a `Mutex`; the mutex also makes the
//! refresh-token rotation check-and-swap atomic, matching the conditional
//! update the Postgres store performs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{EmbeddingRecord, EmbeddingSource, NewUser, RefreshTokenEntry, User};
use crate::types::{AppError, AppResult};

use super::{metadata_matches, EmbeddingFilter, EmbeddingStore, UserStore};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, id: Uuid, f: impl FnOnce(&mut User) -> T) -> AppResult<T> {
        let mut users = self.users.lock().expect("user store poisoned");
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        Ok(f(user))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let mut users = self.users.lock().expect("user store poisoned");

        let taken = users
            .values()
            .any(|u| u.username == new_user.username || u.email == new_user.email);
        if taken {
            return Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            avatar: None,
            active: true,
            last_login: None,
            refresh_tokens: Vec::new(),
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let users = self.users.lock().expect("user store poisoned");
        Ok(users.get(&id).cloned())
    }

    async fn update_last_login(&self, id: Uuid) -> AppResult<()> {
        self.with_user(id, |u| u.last_login = Some(Utc::now()))
    }

    async fn push_refresh_token(&self, id: Uuid, entry: RefreshTokenEntry) -> AppResult<()> {
        self.with_user(id, |u| u.refresh_tokens.push(entry))
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AppResult<bool> {
        self.with_user(id, |u| {
            let before = u.refresh_tokens.len();
            u.refresh_tokens.retain(|t| t.token != old_token);
            if u.refresh_tokens.len() == before {
                return false;
            }
            u.refresh_tokens.push(new_entry);
            true
        })
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> AppResult<()> {
        self.with_user(id, |u| u.refresh_tokens.retain(|t| t.token != token))
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> AppResult<()> {
        self.with_user(id, |u| u.refresh_tokens.clear())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> AppResult<()> {
        self.with_user(id, |u| u.password_hash = password_hash)
    }
}

#[derive(Default)]
pub struct MemoryEmbeddingStore {
    records: Mutex<Vec<EmbeddingRecord>>,
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryEmbeddingStore {
    async fn insert(&self, record: EmbeddingRecord) -> AppResult<EmbeddingRecord> {
        let mut records = self.records.lock().expect("embedding store poisoned");
        records.push(record.clone());
        Ok(record)
    }

    async fn insert_batch(&self, batch: Vec<EmbeddingRecord>) -> AppResult<usize> {
        let mut records = self.records.lock().expect("embedding store poisoned");
        let count = batch.len();
        records.extend(batch);
        Ok(count)
    }

    async fn find_active(&self, filter: &EmbeddingFilter) -> AppResult<Vec<EmbeddingRecord>> {
        let records = self.records.lock().expect("embedding store poisoned");
        Ok(records
            .iter()
            .filter(|r| r.active)
            .filter(|r| filter.source.map(|s| r.source == s).unwrap_or(true))
            .filter(|r| {
                filter
                    .metadata
                    .as_ref()
                    .map(|m| metadata_matches(m, &r.metadata))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<bool> {
        let mut records = self.records.lock().expect("embedding store poisoned");
        match records.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_source(
        &self,
        source: EmbeddingSource,
        source_ref: Uuid,
    ) -> AppResult<u64> {
        let mut records = self.records.lock().expect("embedding store poisoned");
        let before = records.len();
        records.retain(|r| !(r.source == source && r.source_ref == Some(source_ref)));
        Ok((before - records.len()) as u64)
    }
}

//! Postgres-backed [`UserStore`].
//!
//! Refresh tokens are kept as a JSONB array on the user row. Rotation is a
//! single conditional UPDATE guarded by a `@>` containment check, so two
//! concurrent rotations of the same token cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewUser, RefreshTokenEntry, User, UserRole};
use crate::store::UserStore;
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Runtime query_as row; no DATABASE_URL needed at compile time.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    avatar: Option<String>,
    active: bool,
    last_login: Option<DateTime<Utc>>,
    refresh_tokens: Json<Vec<RefreshTokenEntry>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: UserRole::parse(&row.role),
            avatar: row.avatar,
            active: row.active,
            last_login: row.last_login,
            refresh_tokens: row.refresh_tokens.0,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, avatar, active, \
                            last_login, refresh_tokens, created_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        let result = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "User already exists with this email or username".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_last_login(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn push_refresh_token(&self, id: Uuid, entry: RefreshTokenEntry) -> AppResult<()> {
        sqlx::query("UPDATE users SET refresh_tokens = refresh_tokens || $2 WHERE id = $1")
            .bind(id)
            .bind(Json(entry))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        old_token: &str,
        new_entry: RefreshTokenEntry,
    ) -> AppResult<bool> {
        // The containment guard makes remove-and-append atomic: the row is
        // only touched while the presented token is still in the list.
        let result = sqlx::query(
            "UPDATE users SET refresh_tokens = ( \
                 SELECT COALESCE(jsonb_agg(t), '[]'::jsonb) \
                 FROM jsonb_array_elements(refresh_tokens) AS t \
                 WHERE t->>'token' <> $2 \
             ) || $3 \
             WHERE id = $1 \
               AND refresh_tokens @> jsonb_build_array(jsonb_build_object('token', $2::text))",
        )
        .bind(id)
        .bind(old_token)
        .bind(Json(new_entry))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_refresh_token(&self, id: Uuid, token: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET refresh_tokens = ( \
                 SELECT COALESCE(jsonb_agg(t), '[]'::jsonb) \
                 FROM jsonb_array_elements(refresh_tokens) AS t \
                 WHERE t->>'token' <> $2 \
             ) WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_refresh_tokens(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET refresh_tokens = '[]'::jsonb WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: String) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Account and session operations: register, login, refresh rotation,
//! logout, password change, access-token verification.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{NewUser, RefreshTokenEntry, User, UserProfile, UserRole};
use crate::store::UserStore;
use crate::types::{AppError, AppResult};

use super::tokens::{TokenManager, TokenPair, TokenType};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenManager,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenManager, bcrypt_cost: u32) -> Self {
        Self {
            store,
            tokens,
            bcrypt_cost,
        }
    }

    fn hash_password(&self, password: &str) -> AppResult<String> {
        bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        bcrypt::verify(password, hash)
            .map_err(|e| AppError::Internal(format!("password verification failed: {e}")))
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AppResult<(UserProfile, TokenPair)> {
        if username.trim().is_empty() || email.trim().is_empty() {
            return Err(AppError::Validation(
                "Username and email are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let user = self
            .store
            .create_user(NewUser {
                username: username.trim().to_string(),
                email: email.trim().to_string(),
                password_hash: self.hash_password(password)?,
                role: UserRole::User,
            })
            .await?;

        let pair = self.tokens.issue_pair(user.id)?;
        self.store
            .push_refresh_token(
                user.id,
                RefreshTokenEntry {
                    token: pair.refresh_token.clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(((&user).into(), pair))
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<(UserProfile, TokenPair)> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !user.active {
            return Err(AppError::Unauthorized(
                "Account has been deactivated".to_string(),
            ));
        }
        if !self.verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let pair = self.tokens.issue_pair(user.id)?;
        self.store
            .push_refresh_token(
                user.id,
                RefreshTokenEntry {
                    token: pair.refresh_token.clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;
        self.store.update_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok(((&user).into(), pair))
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed; presenting it again fails.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenType::Refresh)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.active)
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

        let pair = self.tokens.issue_pair(user.id)?;
        let rotated = self
            .store
            .rotate_refresh_token(
                user.id,
                refresh_token,
                RefreshTokenEntry {
                    token: pair.refresh_token.clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;

        if !rotated {
            // Not in the stored list: revoked, already rotated, or replayed
            return Err(AppError::Unauthorized(
                "Invalid refresh token".to_string(),
            ));
        }

        Ok(pair)
    }

    /// Revoke one session, or all sessions if no token is given.
    pub async fn logout(&self, user_id: Uuid, refresh_token: Option<&str>) -> AppResult<()> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        match refresh_token {
            Some(token) => self.store.remove_refresh_token(user_id, token).await?,
            None => self.store.clear_refresh_tokens(user_id).await?,
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if !self.verify_password(current_password, &user.password_hash)? {
            return Err(AppError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = self.hash_password(new_password)?;
        self.store.set_password_hash(user_id, hash).await?;
        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    /// Resolve a bearer access token to its user. Rejects refresh tokens,
    /// unknown users, and deactivated accounts.
    pub async fn verify_access_token(&self, token: &str) -> AppResult<User> {
        let claims = self.tokens.verify(token, TokenType::Access)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        if !user.active {
            return Err(AppError::Unauthorized(
                "Your account has been deactivated".to_string(),
            ));
        }

        Ok(user)
    }
}

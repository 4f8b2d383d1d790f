//! JWT access/refresh token issuance and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenManager {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }

    fn sign(&self, user_id: Uuid, token_type: TokenType, ttl: Duration) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    pub fn issue_pair(&self, user_id: Uuid) -> AppResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(user_id, TokenType::Access, self.access_ttl)?,
            refresh_token: self.sign(user_id, TokenType::Refresh, self.refresh_ttl)?,
        })
    }

    /// Verify signature and expiry, and require the expected token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> AppResult<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Token expired".to_string())
            }
            _ => AppError::Unauthorized("Invalid token".to_string()),
        })?;

        if data.claims.token_type != expected {
            let kind = match expected {
                TokenType::Access => "Access",
                TokenType::Refresh => "Refresh",
            };
            return Err(AppError::Unauthorized(format!("{kind} token required")));
        }

        Ok(data.claims)
    }
}

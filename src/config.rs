use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                    .parse()?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            llm: LlmConfig {
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:1234/v1".to_string()),
                api_key: env::var("LLM_API_KEY").unwrap_or_else(|_| "lm-studio".to_string()),
                chat_model: env::var("LLM_CHAT_MODEL")
                    .unwrap_or_else(|_| "mistralai/Mistral-7B-Instruct-v0.3-GGUF".to_string()),
                embedding_model: env::var("LLM_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-ai/nomic-embed-text-v1.5-GGUF".to_string()),
                request_timeout_secs: env::var("LLM_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?,
                access_token_ttl_secs: env::var("ACCESS_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()?,
                refresh_token_ttl_secs: env::var("REFRESH_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "604800".to_string())
                    .parse()?,
                bcrypt_cost: env::var("BCRYPT_COST")
                    .unwrap_or_else(|_| "12".to_string())
                    .parse()?,
            },
        })
    }
}

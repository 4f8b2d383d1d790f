use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

pub mod embeddings;
pub mod users;

pub use embeddings::PgEmbeddingStore;
pub use users::PgUserStore;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(&config.url)
        .await?;

    // Test connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    Ok(pool)
}

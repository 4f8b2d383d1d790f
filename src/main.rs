use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ragchat::auth::{AuthService, TokenManager};
use ragchat::config::Config;
use ragchat::db::{create_pool, PgEmbeddingStore, PgUserStore};
use ragchat::embeddings::EmbeddingService;
use ragchat::llm::{LanguageModel, LmStudioClient};
use ragchat::models::AppState;
use ragchat::rag::RagEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragchat=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = create_pool(&config.database)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let llm: Arc<dyn LanguageModel> = Arc::new(LmStudioClient::new(&config.llm)?);
    let user_store = Arc::new(PgUserStore::new(pool.clone()));
    let embedding_store = Arc::new(PgEmbeddingStore::new(pool));

    let auth = AuthService::new(
        user_store,
        TokenManager::new(&config.auth),
        config.auth.bcrypt_cost,
    );
    let embeddings = EmbeddingService::new(llm.clone(), embedding_store);
    let rag = RagEngine::new(embeddings.clone(), llm.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid HOST/PORT")?;

    let state = AppState {
        config,
        auth,
        embeddings,
        rag,
        llm,
    };
    let app = ragchat::create_router(state);

    tracing::info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .await
        .context("server exited with error")?;

    Ok(())
}

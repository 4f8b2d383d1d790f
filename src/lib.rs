pub mod auth;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod rag;
pub mod routes;
pub mod store;
pub mod types;

pub use routes::create_router;

//! Embedding pipeline: chunking, vector math, and the storage-backed
//! service that ties them to the model server.

pub mod service;
pub mod text_chunker;
pub mod vector_search;

pub use service::{
    CreateOptions, DocumentIngest, EmbeddingService, NewEmbedding, ScoredEmbedding, SearchOptions,
    DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_THRESHOLD,
};
pub use text_chunker::{chunk_text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use vector_search::{cosine_similarity, rank_candidates};

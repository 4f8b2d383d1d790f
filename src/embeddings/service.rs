//! Embedding lifecycle: create, batch-create, similarity search,
//! document ingestion, and deletion.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::llm::LanguageModel;
use crate::models::{ContextItem, EmbeddingRecord, EmbeddingSource};
use crate::store::{EmbeddingFilter, EmbeddingStore};
use crate::types::AppResult;

use super::text_chunker::{chunk_text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use super::vector_search::rank_candidates;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub metadata: Option<serde_json::Value>,
    pub source: Option<EmbeddingSource>,
    pub source_ref: Option<Uuid>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub content: String,
    pub metadata: serde_json::Value,
    pub source: EmbeddingSource,
    pub source_ref: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    pub source: Option<EmbeddingSource>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SEARCH_THRESHOLD,
            source: None,
            metadata: None,
        }
    }
}

/// An embedding record with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredEmbedding {
    pub record: EmbeddingRecord,
    pub similarity: f32,
}

impl From<&ScoredEmbedding> for ContextItem {
    fn from(scored: &ScoredEmbedding) -> Self {
        ContextItem {
            id: scored.record.id,
            content: scored.record.content.clone(),
            similarity: scored.similarity,
            source: scored.record.source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentIngest {
    pub filename: String,
    pub total_chunks: usize,
    pub embeddings_created: usize,
    pub file_size: usize,
}

#[derive(Clone)]
pub struct EmbeddingService {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn EmbeddingStore>,
}

impl EmbeddingService {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self { llm, store }
    }

    fn build_record(
        &self,
        content: String,
        vector: Vec<f32>,
        metadata: serde_json::Value,
        source: EmbeddingSource,
        source_ref: Option<Uuid>,
        model: Option<&str>,
    ) -> EmbeddingRecord {
        let dimensions = vector.len() as i32;
        EmbeddingRecord {
            id: Uuid::new_v4(),
            content,
            vector,
            metadata,
            source,
            source_ref,
            model_name: model.unwrap_or(self.llm.embedding_model()).to_string(),
            dimensions,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Embed one text and persist the record.
    pub async fn create(&self, content: &str, options: CreateOptions) -> AppResult<EmbeddingRecord> {
        let vector = self.llm.embed(content, options.model.as_deref()).await?;
        let record = self.build_record(
            content.to_string(),
            vector,
            options.metadata.unwrap_or_else(|| serde_json::json!({})),
            options.source.unwrap_or(EmbeddingSource::Manual),
            options.source_ref,
            options.model.as_deref(),
        );
        self.store.insert(record).await
    }

    /// Embed many texts in one backend call and bulk-insert the records.
    pub async fn create_batch(&self, items: Vec<NewEmbedding>) -> AppResult<Vec<EmbeddingRecord>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let contents: Vec<String> = items.iter().map(|i| i.content.clone()).collect();
        let vectors = self.llm.embed_batch(&contents, None).await?;

        let records: Vec<EmbeddingRecord> = items
            .into_iter()
            .zip(vectors)
            .map(|(item, vector)| {
                self.build_record(
                    item.content,
                    vector,
                    item.metadata,
                    item.source,
                    item.source_ref,
                    None,
                )
            })
            .collect();

        self.store.insert_batch(records.clone()).await?;
        Ok(records)
    }

    /// Embed the query, fetch active candidates, and rank by cosine
    /// similarity. Results are filtered to `threshold` and capped at
    /// `limit`.
    pub async fn search_similar(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> AppResult<Vec<ScoredEmbedding>> {
        let query_vector = self.llm.embed(query, None).await?;

        let filter = EmbeddingFilter {
            source: options.source,
            metadata: options.metadata.clone(),
        };
        let records = self.store.find_active(&filter).await?;

        let vectors: Vec<Vec<f32>> = records.iter().map(|r| r.vector.clone()).collect();
        let ranked = rank_candidates(&query_vector, &vectors, options.limit, options.threshold)?;

        Ok(ranked
            .into_iter()
            .map(|(i, similarity)| ScoredEmbedding {
                record: records[i].clone(),
                similarity,
            })
            .collect())
    }

    /// Chunk a document, embed every chunk in one batch call, and store the
    /// chunks with provenance metadata.
    pub async fn process_document(
        &self,
        filename: &str,
        text: &str,
        file_size: usize,
        mime_type: &str,
    ) -> AppResult<DocumentIngest> {
        let chunks = chunk_text(text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP);
        let total_chunks = chunks.len();
        let uploaded_at = Utc::now().to_rfc3339();
        let document_ref = Uuid::new_v4();

        let items: Vec<NewEmbedding> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, content)| NewEmbedding {
                content,
                metadata: serde_json::json!({
                    "filename": filename,
                    "fileSize": file_size,
                    "mimeType": mime_type,
                    "chunkIndex": index,
                    "totalChunks": total_chunks,
                    "uploadedAt": uploaded_at,
                }),
                source: EmbeddingSource::Document,
                source_ref: Some(document_ref),
            })
            .collect();

        let created = self.create_batch(items).await?;
        tracing::info!(
            filename,
            total_chunks,
            embeddings_created = created.len(),
            "document processed"
        );

        Ok(DocumentIngest {
            filename: filename.to_string(),
            total_chunks,
            embeddings_created: created.len(),
            file_size,
        })
    }

    pub async fn deactivate(&self, id: Uuid) -> AppResult<bool> {
        self.store.deactivate(id).await
    }

    /// Hard delete every embedding derived from one source object.
    pub async fn delete_by_source(
        &self,
        source: EmbeddingSource,
        source_ref: Uuid,
    ) -> AppResult<u64> {
        self.store.delete_by_source(source, source_ref).await
    }
}

//! Postgres-backed [`EmbeddingStore`]. Vectors are stored as `REAL[]`;
//! similarity scoring happens in-process (see `embeddings::vector_search`),
//! so the database only answers the candidate-set predicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::models::{EmbeddingRecord, EmbeddingSource};
use crate::store::{EmbeddingFilter, EmbeddingStore};
use crate::types::AppResult;

#[derive(Clone)]
pub struct PgEmbeddingStore {
    pool: PgPool,
}

impl PgEmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: Uuid,
    content: String,
    vector: Vec<f32>,
    metadata: serde_json::Value,
    source: String,
    source_ref: Option<Uuid>,
    model_name: String,
    dimensions: i32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<EmbeddingRow> for EmbeddingRecord {
    fn from(row: EmbeddingRow) -> Self {
        EmbeddingRecord {
            id: row.id,
            content: row.content,
            vector: row.vector,
            metadata: row.metadata,
            source: EmbeddingSource::parse(&row.source),
            source_ref: row.source_ref,
            model_name: row.model_name,
            dimensions: row.dimensions,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    async fn insert(&self, record: EmbeddingRecord) -> AppResult<EmbeddingRecord> {
        sqlx::query(
            "INSERT INTO embeddings \
             (id, content, vector, metadata, source, source_ref, model_name, dimensions, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(&record.content)
        .bind(&record.vector)
        .bind(&record.metadata)
        .bind(record.source.as_str())
        .bind(record.source_ref)
        .bind(&record.model_name)
        .bind(record.dimensions)
        .bind(record.active)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_batch(&self, records: Vec<EmbeddingRecord>) -> AppResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO embeddings \
             (id, content, vector, metadata, source, source_ref, model_name, dimensions, active, created_at) ",
        );
        builder.push_values(&records, |mut b, record| {
            b.push_bind(record.id)
                .push_bind(&record.content)
                .push_bind(&record.vector)
                .push_bind(&record.metadata)
                .push_bind(record.source.as_str())
                .push_bind(record.source_ref)
                .push_bind(&record.model_name)
                .push_bind(record.dimensions)
                .push_bind(record.active)
                .push_bind(record.created_at);
        });
        builder.build().execute(&self.pool).await?;

        Ok(records.len())
    }

    async fn find_active(&self, filter: &EmbeddingFilter) -> AppResult<Vec<EmbeddingRecord>> {
        let mut builder = QueryBuilder::new(
            "SELECT id, content, vector, metadata, source, source_ref, model_name, \
             dimensions, active, created_at FROM embeddings WHERE active = TRUE",
        );

        if let Some(source) = filter.source {
            builder.push(" AND source = ").push_bind(source.as_str());
        }
        if let Some(metadata) = &filter.metadata {
            builder
                .push(" AND metadata @> ")
                .push_bind(serde_json::Value::Object(metadata.clone()));
        }
        builder.push(" ORDER BY created_at ASC");

        let rows: Vec<EmbeddingRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("UPDATE embeddings SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_source(
        &self,
        source: EmbeddingSource,
        source_ref: Uuid,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM embeddings WHERE source = $1 AND source_ref = $2")
            .bind(source.as_str())
            .bind(source_ref)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

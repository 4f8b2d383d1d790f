//! Document ingestion through retrieval and answer assembly, using the
//! in-memory embedding store and a deterministic model.

mod common;

use ragchat::embeddings::{CreateOptions, SearchOptions};
use ragchat::models::EmbeddingSource;
use ragchat::rag::RagOptions;

use common::test_state;

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

#[tokio::test]
async fn test_document_upload_chunks_and_embeds() {
    let state = test_state();

    let ingest = state
        .embeddings
        .process_document("notes.txt", &words(900), 5000, "text/plain")
        .await
        .unwrap();

    assert_eq!(ingest.filename, "notes.txt");
    assert_eq!(ingest.total_chunks, 4);
    assert_eq!(ingest.embeddings_created, 4);
    assert_eq!(ingest.file_size, 5000);
}

#[tokio::test]
async fn test_chunk_metadata_carries_provenance() {
    let state = test_state();
    state
        .embeddings
        .process_document("notes.txt", &words(600), 3200, "text/plain")
        .await
        .unwrap();

    let results = state
        .embeddings
        .search_similar("anything", &SearchOptions {
            threshold: 0.0,
            limit: 10,
            ..SearchOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    for scored in &results {
        assert_eq!(scored.record.source, EmbeddingSource::Document);
        assert!(scored.record.source_ref.is_some());
        assert_eq!(scored.record.metadata["filename"], "notes.txt");
        assert_eq!(scored.record.metadata["totalChunks"], 3);
    }
}

#[tokio::test]
async fn test_search_respects_threshold() {
    let state = test_state();
    state
        .embeddings
        .create(
            "cooking pasta at home",
            CreateOptions::default(),
        )
        .await
        .unwrap();

    // Orthogonal topic: similarity 0.0, below any positive threshold
    let results = state
        .embeddings
        .search_similar("rust borrow checker", &SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let results = state
        .embeddings
        .search_similar("cooking tips", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_rag_answer_uses_stored_context() {
    let state = test_state();
    state
        .embeddings
        .create("rust ownership rules", CreateOptions::default())
        .await
        .unwrap();
    state
        .embeddings
        .create("cooking pasta at home", CreateOptions::default())
        .await
        .unwrap();

    let answer = state
        .rag
        .answer("how does rust ownership work", &RagOptions::default())
        .await
        .unwrap();

    assert_eq!(answer.response, "canned response");
    assert_eq!(answer.context.len(), 1);
    assert!(answer.context[0].content.contains("rust"));
    assert!(answer.context[0].similarity >= 0.6);
}

#[tokio::test]
async fn test_delete_by_source_removes_document_chunks() {
    let state = test_state();
    state
        .embeddings
        .process_document("notes.txt", &words(600), 3200, "text/plain")
        .await
        .unwrap();

    let all = state
        .embeddings
        .search_similar("anything", &SearchOptions {
            threshold: 0.0,
            limit: 10,
            ..SearchOptions::default()
        })
        .await
        .unwrap();
    let doc_ref = all[0].record.source_ref.unwrap();

    let removed = state
        .embeddings
        .delete_by_source(EmbeddingSource::Document, doc_ref)
        .await
        .unwrap();
    assert_eq!(removed, 3);

    let remaining = state
        .embeddings
        .search_similar("anything", &SearchOptions {
            threshold: 0.0,
            limit: 10,
            ..SearchOptions::default()
        })
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_deactivated_embeddings_drop_out_of_search() {
    let state = test_state();
    let record = state
        .embeddings
        .create("rust ownership rules", CreateOptions::default())
        .await
        .unwrap();

    assert!(state.embeddings.deactivate(record.id).await.unwrap());

    let results = state
        .embeddings
        .search_similar("rust", &SearchOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

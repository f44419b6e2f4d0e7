//! Vector store gateway.
//!
//! The only way the rest of the backend reads or writes persisted chunks.
//! Owns the embedding client, enforces owner scoping on every operation,
//! and guarantees that a document's chunk set commits as one batch or not
//! at all (embeddings are produced up front; nothing is written on failure).

use std::sync::Arc;

use uuid::Uuid;

use super::{
    ChunkRecord, ContentType, FilterField, SearchFilter, SearchHit, StoredDocument, VectorStore,
};
use crate::core::errors::PipelineError;
use crate::llm::LlmClient;

/// Oversampling factor for the degraded scan-and-filter search path.
const UNFILTERED_OVERSAMPLE: usize = 16;

pub struct VectorStoreGateway {
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
}

impl VectorStoreGateway {
    pub fn new(store: Arc<dyn VectorStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }

    /// Provision backend schema. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), PipelineError> {
        self.store.ensure_schema().await
    }

    /// Embed and persist a document's full chunk set as a single batch.
    ///
    /// Every chunk is stamped with the document's owner before writing; if
    /// any embedding call fails no chunk is committed.
    pub async fn upsert_chunks(
        &self,
        document: &StoredDocument,
        chunks: Vec<ChunkRecord>,
        api_key: Option<&str>,
    ) -> Result<usize, PipelineError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.llm.embed(&texts, api_key).await?;

        let items: Vec<(ChunkRecord, Vec<f32>)> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(mut chunk, embedding)| {
                chunk.owner_id = document.owner_id.clone();
                chunk.document_id = document.id;
                (chunk, embedding)
            })
            .collect();

        let count = items.len();
        self.store.upsert_document(document, items).await?;
        tracing::info!(
            document_id = %document.id,
            chunks = count,
            "ingested document"
        );
        Ok(count)
    }

    /// Owner-scoped similarity search for `query_text`.
    ///
    /// Results are re-checked against the owner scope before returning,
    /// whichever path produced them.
    pub async fn search(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        limit: usize,
        api_key: Option<&str>,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let embeddings = self.llm.embed(&[query_text.to_string()], api_key).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Embedding("no embedding returned".to_string()))?;

        let hits = if self.can_filter(filter) {
            self.store.search(&query_embedding, filter, limit).await?
        } else {
            // Degraded path: the backend cannot apply this filter itself.
            // Oversample, then filter in process.
            tracing::warn!(
                owner_id = %filter.owner_id,
                "store missing filter index; falling back to scan-and-filter"
            );
            self.scan_and_filter(&query_embedding, filter, limit).await?
        };

        // Owner isolation holds regardless of which path produced the hits.
        Ok(hits
            .into_iter()
            .filter(|hit| hit.chunk.owner_id == filter.owner_id)
            .take(limit)
            .collect())
    }

    fn can_filter(&self, filter: &SearchFilter) -> bool {
        let mut ok = self.store.supports_filter(FilterField::OwnerId);
        if filter.document_id.is_some() {
            ok = ok && self.store.supports_filter(FilterField::DocumentId);
        }
        if filter.content_type.is_some() {
            ok = ok && self.store.supports_filter(FilterField::ContentType);
        }
        ok
    }

    async fn scan_and_filter(
        &self,
        query_embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let candidates = self
            .store
            .search_unfiltered(query_embedding, limit * UNFILTERED_OVERSAMPLE)
            .await?;

        let mut hits = Vec::new();
        for hit in candidates {
            let content_type = match filter.content_type {
                Some(_) => match self
                    .store
                    .document_content_type(hit.chunk.document_id)
                    .await?
                {
                    Some(ct) => ct,
                    None => continue,
                },
                // Filter does not constrain content type; value unused.
                None => ContentType::Note,
            };
            if filter.matches(&hit.chunk, content_type) {
                hits.push(hit);
                if hits.len() == limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    pub async fn list_documents(
        &self,
        owner_id: &str,
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<StoredDocument>, usize), PipelineError> {
        self.store
            .list_documents(owner_id, content_type, limit, offset)
            .await
    }

    pub async fn get_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, PipelineError> {
        self.store.get_document(owner_id, document_id).await
    }

    pub async fn get_chunks(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Vec<ChunkRecord>, PipelineError> {
        self.store.get_chunks(owner_id, document_id).await
    }

    /// Remove a document and all of its chunks. Idempotent.
    pub async fn delete_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<usize, PipelineError> {
        let removed = self.store.delete_document(owner_id, document_id).await?;
        if removed > 0 {
            tracing::info!(%document_id, chunks = removed, "deleted document");
        }
        Ok(removed)
    }

    /// Remove every document and chunk the owner has stored. Idempotent.
    pub async fn delete_all_for_user(&self, owner_id: &str) -> Result<usize, PipelineError> {
        let removed = self.store.delete_all_for_user(owner_id).await?;
        if removed > 0 {
            tracing::info!(owner_id, chunks = removed, "deleted all content for user");
        }
        Ok(removed)
    }
}

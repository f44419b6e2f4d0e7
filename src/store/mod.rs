//! Persistent document/chunk records and the vector store seam.
//!
//! The rest of the pipeline only touches storage through
//! [`gateway::VectorStoreGateway`], which in turn talks to a [`VectorStore`]
//! implementation. The shipped backend is SQLite ([`sqlite::SqliteVectorStore`]);
//! the trait keeps the backend swappable and testable.

mod gateway;
mod sqlite;

pub use gateway::VectorStoreGateway;
pub use sqlite::SqliteVectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::PipelineError;

/// The closed set of ingestable content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Note,
    Document,
    Url,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Note => "note",
            ContentType::Document => "document",
            ContentType::Url => "url",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "note" => Some(ContentType::Note),
            "document" => Some(ContentType::Document),
            "url" => Some(ContentType::Url),
            _ => None,
        }
    }
}

/// Typed document metadata plus an open extension map.
///
/// Required invariant-bearing fields are typed; per-content-type extras
/// ride in `extra` without schema changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crawled_urls: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        let now = Utc::now();
        DocumentMetadata {
            created_at: now,
            updated_at: now,
            file_name: None,
            file_type: None,
            url: None,
            tags: Vec::new(),
            hostname: None,
            total_pages: None,
            total_chunks: None,
            crawl_depth: None,
            crawled_urls: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// A logical ingested unit: one note, file, or crawled site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub content_type: ContentType,
    pub metadata: DocumentMetadata,
    pub chunk_count: usize,
}

/// Position of a chunk within a crawled page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRef {
    pub page_index: usize,
    pub page_chunk_index: usize,
    pub page_url: String,
    pub page_title: String,
}

/// The atomic stored/retrievable unit. Owner and document ids are
/// denormalized so flat storage can filter without joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub content: String,
    pub owner_id: String,
    pub document_id: Uuid,
    /// Zero-based position in the document's global chunk order.
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageRef>,
}

/// One similarity search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub document_title: String,
    /// Cosine similarity, higher is better.
    pub score: f32,
}

/// Keyword filter applied to a search, always owner-scoped.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub owner_id: String,
    pub document_id: Option<Uuid>,
    pub content_type: Option<ContentType>,
}

impl SearchFilter {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        SearchFilter {
            owner_id: owner_id.into(),
            document_id: None,
            content_type: None,
        }
    }

    /// True when `chunk` (with its parent's content type) passes this filter.
    pub fn matches(&self, chunk: &ChunkRecord, content_type: ContentType) -> bool {
        chunk.owner_id == self.owner_id
            && self.document_id.map(|id| chunk.document_id == id).unwrap_or(true)
            && self.content_type.map(|ct| ct == content_type).unwrap_or(true)
    }
}

/// Filterable payload fields a backend may or may not index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    OwnerId,
    DocumentId,
    ContentType,
}

/// Abstract vector store backend.
///
/// Implementations must treat `ensure_schema` as idempotent and
/// `delete_document` on a missing document as a successful no-op.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Provision collections/tables/indexes. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<(), PipelineError>;

    /// Whether this backend can filter on `field` natively. When it cannot,
    /// callers fall back to unfiltered search plus in-process filtering.
    fn supports_filter(&self, field: FilterField) -> bool;

    /// Write a document and its full chunk set as one atomic batch.
    async fn upsert_document(
        &self,
        document: &StoredDocument,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), PipelineError>;

    /// Nearest-neighbor search under `filter`, descending by score.
    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError>;

    /// Unfiltered nearest-neighbor search. Degraded path used when the
    /// required filter field is not indexed; callers must re-filter.
    async fn search_unfiltered(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError>;

    /// Content type of a chunk's parent document, for in-process filtering.
    async fn document_content_type(
        &self,
        document_id: Uuid,
    ) -> Result<Option<ContentType>, PipelineError>;

    async fn list_documents(
        &self,
        owner_id: &str,
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<StoredDocument>, usize), PipelineError>;

    async fn get_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, PipelineError>;

    /// All chunks of a document in `chunk_index` order.
    async fn get_chunks(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Vec<ChunkRecord>, PipelineError>;

    /// Remove every chunk matching owner + document. Returns removed count;
    /// zero is not an error.
    async fn delete_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<usize, PipelineError>;

    /// Remove every document and chunk the owner has stored. Returns removed
    /// chunk count; zero is not an error.
    async fn delete_all_for_user(&self, owner_id: &str) -> Result<usize, PipelineError>;
}

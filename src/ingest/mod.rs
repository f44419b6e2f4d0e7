//! Document ingestion pipeline.
//!
//! Normalizers turn each input type into plain text, the chunker splits it,
//! and [`IngestService`] stamps identity onto every chunk and writes the
//! batch through the vector store gateway.

pub mod chunker;
pub mod crawler;
pub mod extract;
pub mod html;
pub mod normalize;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::core::errors::PipelineError;
use crate::store::{
    ChunkRecord, DocumentMetadata, PageRef, StoredDocument, VectorStoreGateway,
};
use chunker::{ChunkConfig, TextSplitter};
use crawler::{CrawlOptions, Crawler};
use normalize::NormalizedContent;

pub struct IngestService {
    gateway: Arc<VectorStoreGateway>,
    splitter: TextSplitter,
}

impl IngestService {
    pub fn new(gateway: Arc<VectorStoreGateway>, chunking: ChunkConfig) -> Self {
        Self {
            gateway,
            splitter: TextSplitter::new(chunking),
        }
    }

    /// Ingest a raw text note.
    pub async fn ingest_note(
        &self,
        owner_id: &str,
        content: &str,
        title: Option<String>,
        tags: Vec<String>,
        api_key: Option<&str>,
    ) -> Result<StoredDocument, PipelineError> {
        let normalized = normalize::normalize_note(content, title)?;
        self.ingest_normalized(owner_id, normalized, tags, api_key)
            .await
    }

    /// Ingest an uploaded file.
    pub async fn ingest_file(
        &self,
        owner_id: &str,
        bytes: &[u8],
        mime: &str,
        file_name: &str,
        title: Option<String>,
        tags: Vec<String>,
        api_key: Option<&str>,
    ) -> Result<StoredDocument, PipelineError> {
        let normalized = normalize::normalize_file(bytes, mime, file_name, title)?;
        self.ingest_normalized(owner_id, normalized, tags, api_key)
            .await
    }

    /// Ingest a URL: a single page by default, or a recursive site crawl
    /// when crawl options are supplied.
    pub async fn ingest_url(
        &self,
        owner_id: &str,
        url: &str,
        title: Option<String>,
        tags: Vec<String>,
        crawl: Option<CrawlOptions>,
        api_key: Option<&str>,
    ) -> Result<StoredDocument, PipelineError> {
        match crawl {
            Some(options) => {
                self.ingest_website(owner_id, url, title, tags, options, api_key)
                    .await
            }
            None => {
                let options = CrawlOptions::default();
                let crawler = Crawler::new(Duration::from_secs(options.timeout_secs))?;
                let parsed = url::Url::parse(url)
                    .map_err(|err| PipelineError::InvalidUrl(format!("{url}: {err}")))?;
                let text = crawler.fetch_page_text(&parsed).await?;
                let normalized = normalize::normalize_page(&parsed, text, title)?;
                self.ingest_normalized(owner_id, normalized, tags, api_key)
                    .await
            }
        }
    }

    /// Crawl a site and ingest all pages as one document. Chunking runs per
    /// page so no chunk straddles two pages; chunk indexes are then
    /// renumbered globally.
    pub async fn ingest_website(
        &self,
        owner_id: &str,
        seed: &str,
        title: Option<String>,
        tags: Vec<String>,
        options: CrawlOptions,
        api_key: Option<&str>,
    ) -> Result<StoredDocument, PipelineError> {
        let crawler = Crawler::new(Duration::from_secs(options.timeout_secs))?;
        let pages = crawler.crawl(seed, &options).await?;

        let hostname = url::Url::parse(seed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| seed.to_string());

        let document_id = Uuid::new_v4();
        let mut chunks: Vec<ChunkRecord> = Vec::new();
        for (page_index, page) in pages.iter().enumerate() {
            for (page_chunk_index, piece) in self.splitter.split(&page.text)?.into_iter().enumerate()
            {
                chunks.push(ChunkRecord {
                    content: piece.content,
                    owner_id: owner_id.to_string(),
                    document_id,
                    chunk_index: chunks.len(),
                    page: Some(PageRef {
                        page_index,
                        page_chunk_index,
                        page_url: page.url.clone(),
                        page_title: page.title.clone(),
                    }),
                });
            }
        }

        let mut metadata = DocumentMetadata::new();
        metadata.url = Some(seed.to_string());
        metadata.tags = tags;
        metadata.hostname = Some(hostname.clone());
        metadata.total_pages = Some(pages.len());
        metadata.total_chunks = Some(chunks.len());
        metadata.crawl_depth = Some(options.max_depth);
        metadata.crawled_urls = pages.iter().map(|p| p.url.clone()).collect();

        let mut document = StoredDocument {
            id: document_id,
            owner_id: owner_id.to_string(),
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(hostname),
            content_type: crate::store::ContentType::Url,
            metadata,
            chunk_count: chunks.len(),
        };

        let count = self
            .gateway
            .upsert_chunks(&document, chunks, api_key)
            .await?;
        document.chunk_count = count;
        Ok(document)
    }

    async fn ingest_normalized(
        &self,
        owner_id: &str,
        normalized: NormalizedContent,
        tags: Vec<String>,
        api_key: Option<&str>,
    ) -> Result<StoredDocument, PipelineError> {
        let pieces = self.splitter.split(&normalized.text)?;

        let document_id = Uuid::new_v4();
        let chunks: Vec<ChunkRecord> = pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, piece)| ChunkRecord {
                content: piece.content,
                owner_id: owner_id.to_string(),
                document_id,
                chunk_index,
                page: None,
            })
            .collect();

        let mut metadata = DocumentMetadata::new();
        metadata.file_name = normalized.file_name;
        metadata.file_type = normalized.file_type;
        metadata.url = normalized.url;
        metadata.tags = tags;
        metadata.total_chunks = Some(chunks.len());

        let mut document = StoredDocument {
            id: document_id,
            owner_id: owner_id.to_string(),
            title: normalized.title,
            content_type: normalized.content_type,
            metadata,
            chunk_count: chunks.len(),
        };

        let count = self
            .gateway
            .upsert_chunks(&document, chunks, api_key)
            .await?;
        document.chunk_count = count;
        Ok(document)
    }
}

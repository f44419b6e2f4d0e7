//! SQLite-backed vector store.
//!
//! Chunk text and metadata live in SQLite; embeddings are serialized as
//! little-endian f32 blobs and searched with brute-force cosine similarity
//! in process. No external server required.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    ChunkRecord, ContentType, DocumentMetadata, FilterField, PageRef, SearchFilter, SearchHit,
    StoredDocument, VectorStore,
};
use crate::core::errors::PipelineError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, PipelineError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(PipelineError::store)?;

        let store = Self { pool, db_path };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Serialize an embedding to bytes (little-endian f32).
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize an embedding from bytes.
    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Cosine similarity between two vectors.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn hit_from_row(row: &sqlx::sqlite::SqliteRow, score: f32) -> Option<SearchHit> {
        let document_id = Uuid::parse_str(&row.get::<String, _>("document_id")).ok()?;
        let page = match row.get::<Option<i64>, _>("page_index") {
            Some(page_index) => Some(PageRef {
                page_index: page_index as usize,
                page_chunk_index: row.get::<Option<i64>, _>("page_chunk_index").unwrap_or(0)
                    as usize,
                page_url: row.get::<Option<String>, _>("page_url").unwrap_or_default(),
                page_title: row.get::<Option<String>, _>("page_title").unwrap_or_default(),
            }),
            None => None,
        };

        Some(SearchHit {
            chunk: ChunkRecord {
                content: row.get("content"),
                owner_id: row.get("owner_id"),
                document_id,
                chunk_index: row.get::<i64, _>("chunk_index") as usize,
                page,
            },
            document_title: row.get("doc_title"),
            score,
        })
    }

    fn scored_hits(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
        embedding: &[f32],
        limit: usize,
    ) -> Vec<SearchHit> {
        let mut scored: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                if blob.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&blob);
                Self::hit_from_row(row, Self::cosine_similarity(embedding, &stored))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        scored
    }

    fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Option<StoredDocument> {
        let id = Uuid::parse_str(&row.get::<String, _>("id")).ok()?;
        let content_type = ContentType::parse(&row.get::<String, _>("content_type"))?;
        let metadata: DocumentMetadata =
            serde_json::from_str(&row.get::<String, _>("metadata")).ok()?;

        Some(StoredDocument {
            id,
            owner_id: row.get("owner_id"),
            title: row.get("title"),
            content_type,
            metadata,
            chunk_count: row.get::<i64, _>("chunk_count") as usize,
        })
    }
}

const SELECT_CHUNKS: &str = "SELECT c.content, c.owner_id, c.document_id, c.chunk_index,
        c.page_index, c.page_chunk_index, c.page_url, c.page_title, c.embedding,
        d.title AS doc_title
     FROM chunks c JOIN documents d ON d.id = c.document_id";

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::store)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content_type TEXT NOT NULL DEFAULT 'note',
                page_index INTEGER,
                page_chunk_index INTEGER,
                page_url TEXT,
                page_title TEXT,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(PipelineError::store)?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_chunks_owner ON chunks(owner_id)",
            "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)",
            "CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)",
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(PipelineError::store)?;
        }

        Ok(())
    }

    fn supports_filter(&self, field: FilterField) -> bool {
        matches!(
            field,
            FilterField::OwnerId | FilterField::DocumentId | FilterField::ContentType
        )
    }

    async fn upsert_document(
        &self,
        document: &StoredDocument,
        chunks: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(PipelineError::store)?;

        let metadata =
            serde_json::to_string(&document.metadata).map_err(PipelineError::store)?;
        sqlx::query(
            "INSERT OR REPLACE INTO documents (id, owner_id, title, content_type, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(document.id.to_string())
        .bind(&document.owner_id)
        .bind(&document.title)
        .bind(document.content_type.as_str())
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(PipelineError::store)?;

        // Replace semantics: a re-ingested document id swaps its chunk set.
        sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;

        for (chunk, embedding) in &chunks {
            let blob = Self::serialize_embedding(embedding);
            let (page_index, page_chunk_index, page_url, page_title) = match &chunk.page {
                Some(page) => (
                    Some(page.page_index as i64),
                    Some(page.page_chunk_index as i64),
                    Some(page.page_url.clone()),
                    Some(page.page_title.clone()),
                ),
                None => (None, None, None, None),
            };

            sqlx::query(
                "INSERT INTO chunks (id, document_id, owner_id, content, chunk_index,
                    content_type, page_index, page_chunk_index, page_url, page_title, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(chunk.document_id.to_string())
            .bind(&chunk.owner_id)
            .bind(&chunk.content)
            .bind(chunk.chunk_index as i64)
            .bind(document.content_type.as_str())
            .bind(page_index)
            .bind(page_chunk_index)
            .bind(page_url)
            .bind(page_title)
            .bind(blob)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;
        }

        tx.commit().await.map_err(PipelineError::store)?;
        tracing::debug!(
            "Stored document {} with {} chunks",
            document.id,
            chunks.len()
        );
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let mut sql = format!("{SELECT_CHUNKS} WHERE c.owner_id = ?1");
        if filter.document_id.is_some() {
            sql.push_str(" AND c.document_id = ?2");
        }
        if filter.content_type.is_some() {
            sql.push_str(if filter.document_id.is_some() {
                " AND c.content_type = ?3"
            } else {
                " AND c.content_type = ?2"
            });
        }

        let mut query = sqlx::query(&sql).bind(&filter.owner_id);
        if let Some(document_id) = filter.document_id {
            query = query.bind(document_id.to_string());
        }
        if let Some(content_type) = filter.content_type {
            query = query.bind(content_type.as_str());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(PipelineError::store)?;
        Ok(self.scored_hits(rows, embedding, limit))
    }

    async fn search_unfiltered(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let rows = sqlx::query(SELECT_CHUNKS)
            .fetch_all(&self.pool)
            .await
            .map_err(PipelineError::store)?;
        Ok(self.scored_hits(rows, embedding, limit))
    }

    async fn document_content_type(
        &self,
        document_id: Uuid,
    ) -> Result<Option<ContentType>, PipelineError> {
        let row = sqlx::query("SELECT content_type FROM documents WHERE id = ?1")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::store)?;
        Ok(row.and_then(|r| ContentType::parse(&r.get::<String, _>("content_type"))))
    }

    async fn list_documents(
        &self,
        owner_id: &str,
        content_type: Option<ContentType>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<StoredDocument>, usize), PipelineError> {
        let (list_sql, count_sql) = if content_type.is_some() {
            (
                "SELECT d.*, (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
                 FROM documents d WHERE d.owner_id = ?1 AND d.content_type = ?2
                 ORDER BY d.created_at DESC LIMIT ?3 OFFSET ?4",
                "SELECT COUNT(*) FROM documents WHERE owner_id = ?1 AND content_type = ?2",
            )
        } else {
            (
                "SELECT d.*, (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
                 FROM documents d WHERE d.owner_id = ?1
                 ORDER BY d.created_at DESC LIMIT ?2 OFFSET ?3",
                "SELECT COUNT(*) FROM documents WHERE owner_id = ?1",
            )
        };

        let mut list_query = sqlx::query(list_sql).bind(owner_id);
        let mut count_query = sqlx::query_scalar::<_, i64>(count_sql).bind(owner_id);
        if let Some(ct) = content_type {
            list_query = list_query.bind(ct.as_str());
            count_query = count_query.bind(ct.as_str());
        }
        list_query = list_query.bind(limit as i64).bind(offset as i64);

        let rows = list_query
            .fetch_all(&self.pool)
            .await
            .map_err(PipelineError::store)?;
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(PipelineError::store)?;

        let documents = rows.iter().filter_map(Self::document_from_row).collect();
        Ok((documents, total as usize))
    }

    async fn get_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Option<StoredDocument>, PipelineError> {
        let row = sqlx::query(
            "SELECT d.*, (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
             FROM documents d WHERE d.owner_id = ?1 AND d.id = ?2",
        )
        .bind(owner_id)
        .bind(document_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::store)?;

        Ok(row.as_ref().and_then(Self::document_from_row))
    }

    async fn get_chunks(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<Vec<ChunkRecord>, PipelineError> {
        let rows = sqlx::query(&format!(
            "{SELECT_CHUNKS} WHERE c.owner_id = ?1 AND c.document_id = ?2
             ORDER BY c.chunk_index ASC"
        ))
        .bind(owner_id)
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::store)?;

        Ok(rows
            .iter()
            .filter_map(|row| Self::hit_from_row(row, 0.0).map(|hit| hit.chunk))
            .collect())
    }

    async fn delete_document(
        &self,
        owner_id: &str,
        document_id: Uuid,
    ) -> Result<usize, PipelineError> {
        let mut tx = self.pool.begin().await.map_err(PipelineError::store)?;

        let result = sqlx::query("DELETE FROM chunks WHERE owner_id = ?1 AND document_id = ?2")
            .bind(owner_id)
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;

        sqlx::query("DELETE FROM documents WHERE owner_id = ?1 AND id = ?2")
            .bind(owner_id)
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;

        tx.commit().await.map_err(PipelineError::store)?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_all_for_user(&self, owner_id: &str) -> Result<usize, PipelineError> {
        let mut tx = self.pool.begin().await.map_err(PipelineError::store)?;

        let result = sqlx::query("DELETE FROM chunks WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;

        sqlx::query("DELETE FROM documents WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(PipelineError::store)?;

        tx.commit().await.map_err(PipelineError::store)?;
        Ok(result.rows_affected() as usize)
    }
}

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::ApiError;
use crate::ingest::crawler::CrawlOptions;
use crate::server::auth;
use crate::state::AppState;
use crate::store::{ContentType, StoredDocument};

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub content: String,
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlBody {
    pub url: String,
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub crawl_options: Option<CrawlOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub content_type: Option<String>,
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

fn parse_document_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .ok()
        .filter(|id| id.get_version_num() == 4)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid document id: {raw}")))
}

fn ingested_response(document: &StoredDocument) -> Json<Value> {
    Json(json!({
        "documentId": document.id,
        "title": document.title,
        "contentType": document.content_type,
        "chunksCount": document.chunk_count,
        "metadata": document.metadata,
    }))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let api_key = auth::api_key_override(&headers);

    let mut file: Option<(Vec<u8>, String, String)> = None;
    let mut title: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(String::from)
                    .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
                file = Some((bytes.to_vec(), mime, file_name));
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read title: {e}")))?;
                if !value.trim().is_empty() {
                    title = Some(value.trim().to_string());
                }
            }
            Some("tags") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read tags: {e}")))?;
                tags = parse_tags(&value);
            }
            _ => {}
        }
    }

    let (bytes, mime, file_name) =
        file.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    let document = state
        .ingest
        .ingest_file(
            &owner_id,
            &bytes,
            &mime,
            &file_name,
            title,
            tags,
            api_key.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, ingested_response(&document)))
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NoteBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let api_key = auth::api_key_override(&headers);

    let document = state
        .ingest
        .ingest_note(
            &owner_id,
            &body.content,
            body.title,
            body.tags,
            api_key.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, ingested_response(&document)))
}

pub async fn create_from_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UrlBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let api_key = auth::api_key_override(&headers);

    let document = state
        .ingest
        .ingest_url(
            &owner_id,
            &body.url,
            body.title,
            body.tags,
            body.crawl_options,
            api_key.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, ingested_response(&document)))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;

    let content_type = match params.content_type.as_deref() {
        Some(raw) => Some(
            ContentType::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown content type: {raw}")))?,
        ),
        None => None,
    };
    let limit = params.limit.unwrap_or(50).min(200);
    let offset = params.offset.unwrap_or(0);

    let (documents, total) = state
        .gateway
        .list_documents(&owner_id, content_type, limit, offset)
        .await?;

    Ok(Json(json!({
        "documents": documents,
        "totalCount": total,
    })))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let document_id = parse_document_id(&id)?;

    let document = state
        .gateway
        .get_document(&owner_id, document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document {document_id} not found")))?;
    let chunks = state.gateway.get_chunks(&owner_id, document_id).await?;

    Ok(Json(json!({
        "document": {
            "id": document.id,
            "title": document.title,
            "contentType": document.content_type,
            "chunksCount": document.chunk_count,
            "metadata": document.metadata,
            "chunks": chunks,
        }
    })))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = auth::require_user(&headers)?;
    let document_id = parse_document_id(&id)?;

    // Deletion is idempotent: removing an absent document still succeeds.
    state.gateway.delete_document(&owner_id, document_id).await?;

    Ok(Json(json!({
        "deletedDocumentId": document_id,
        "message": "document deleted",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(parse_tags("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_tags("  ").is_empty());
    }

    #[test]
    fn document_id_must_be_uuid_v4() {
        assert!(parse_document_id("not-a-uuid").is_err());
        // v1 UUIDs are rejected even though they parse.
        assert!(parse_document_id("8a6e0804-2bd0-1060-b827-e8b4cdcaa2bf").is_err());
        assert!(parse_document_id(&Uuid::new_v4().to_string()).is_ok());
    }
}

//! Content normalizers.
//!
//! Each input type (note, file upload, web page) becomes plain text plus
//! document metadata seeds, ready for chunking.

use url::Url;

use super::extract::{extract_text, FileKind};
use crate::core::errors::PipelineError;
use crate::store::ContentType;

const TITLE_MAX_CHARS: usize = 80;

/// Normalized input: plain text plus the metadata the document will carry.
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    pub title: String,
    pub content_type: ContentType,
    pub text: String,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub url: Option<String>,
}

/// Normalize a raw text note. The title defaults to a truncated first line.
pub fn normalize_note(
    content: &str,
    title: Option<String>,
) -> Result<NormalizedContent, PipelineError> {
    if content.trim().is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| default_note_title(content));

    Ok(NormalizedContent {
        title,
        content_type: ContentType::Note,
        text: content.to_string(),
        file_name: None,
        file_type: None,
        url: None,
    })
}

/// Normalize an uploaded file by dispatching to the per-format extractor.
pub fn normalize_file(
    bytes: &[u8],
    mime: &str,
    file_name: &str,
    title: Option<String>,
) -> Result<NormalizedContent, PipelineError> {
    let kind = FileKind::from_mime(mime, file_name)?;
    let text = extract_text(kind, bytes, file_name)?;

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_stem(file_name));

    Ok(NormalizedContent {
        title,
        content_type: ContentType::Document,
        text,
        file_name: Some(file_name.to_string()),
        file_type: Some(mime.to_string()),
        url: None,
    })
}

/// Normalize a single fetched web page (already converted to text).
pub fn normalize_page(
    url: &Url,
    text: String,
    title: Option<String>,
) -> Result<NormalizedContent, PipelineError> {
    if text.trim().is_empty() {
        return Err(PipelineError::NoContentExtracted(url.to_string()));
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| url.host_str().unwrap_or("website").to_string());

    Ok(NormalizedContent {
        title,
        content_type: ContentType::Url,
        text,
        file_name: None,
        file_type: None,
        url: Some(url.to_string()),
    })
}

fn default_note_title(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled note");

    if first_line.chars().count() <= TITLE_MAX_CHARS {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{truncated}...")
    }
}

fn file_stem(file_name: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    if stem.is_empty() {
        file_name.to_string()
    } else {
        stem.to_string()
    }
}

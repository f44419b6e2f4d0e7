//! File text extraction.
//!
//! Dispatches on the declared MIME type to a per-format extractor. Only
//! PDF, DOCX, plain text, and Markdown are accepted; anything else is an
//! `UnsupportedFileType` error before any bytes are inspected.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::core::errors::PipelineError;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
    Markdown,
}

impl FileKind {
    /// Resolve a declared MIME type, falling back to the file extension for
    /// generic types like `application/octet-stream`.
    pub fn from_mime(mime: &str, file_name: &str) -> Result<Self, PipelineError> {
        let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => return Ok(FileKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                return Ok(FileKind::Docx)
            }
            "text/plain" => return Ok(FileKind::Text),
            "text/markdown" | "text/x-markdown" => return Ok(FileKind::Markdown),
            "" | "application/octet-stream" => {}
            other => return Err(PipelineError::UnsupportedFileType(other.to_string())),
        }

        let ext = file_name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            "txt" => Ok(FileKind::Text),
            "md" | "markdown" => Ok(FileKind::Markdown),
            _ => Err(PipelineError::UnsupportedFileType(format!(
                "{} ({})",
                mime, file_name
            ))),
        }
    }
}

/// Extract plain text from an uploaded file.
pub fn extract_text(kind: FileKind, bytes: &[u8], file_name: &str) -> Result<String, PipelineError> {
    let text = match kind {
        FileKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|err| PipelineError::NoContentExtracted(format!("{file_name}: {err}")))?,
        FileKind::Docx => docx_text(bytes, file_name)?,
        FileKind::Text | FileKind::Markdown => String::from_utf8_lossy(bytes).to_string(),
    };

    let text = text.replace("\r\n", "\n");
    if text.trim().is_empty() {
        return Err(PipelineError::NoContentExtracted(file_name.to_string()));
    }
    Ok(text)
}

/// Pull paragraph text out of the DOCX main document part.
fn docx_text(bytes: &[u8], file_name: &str) -> Result<String, PipelineError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| PipelineError::NoContentExtracted(format!("{file_name}: {err}")))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| PipelineError::NoContentExtracted(format!("{file_name}: {err}")))?
        .read_to_string(&mut xml)
        .map_err(|err| PipelineError::NoContentExtracted(format!("{file_name}: {err}")))?;

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(text)) => {
                if let Ok(fragment) = text.unescape() {
                    out.push_str(&fragment);
                }
            }
            // Paragraph ends become newlines so structure survives chunking.
            Ok(Event::End(end)) if end.name().as_ref() == b"w:p" => out.push('\n'),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(PipelineError::NoContentExtracted(format!(
                    "{file_name}: {err}"
                )))
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mime_dispatch() {
        assert_eq!(
            FileKind::from_mime("application/pdf", "report.pdf").unwrap(),
            FileKind::Pdf
        );
        assert_eq!(
            FileKind::from_mime("text/plain; charset=utf-8", "notes.txt").unwrap(),
            FileKind::Text
        );
        assert_eq!(
            FileKind::from_mime("application/octet-stream", "readme.md").unwrap(),
            FileKind::Markdown
        );
        assert!(matches!(
            FileKind::from_mime("image/png", "photo.png"),
            Err(PipelineError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn plain_text_roundtrip() {
        let text = extract_text(FileKind::Text, b"line one\r\nline two", "a.txt").unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[test]
    fn empty_file_is_no_content() {
        let err = extract_text(FileKind::Text, b"   ", "a.txt").unwrap_err();
        assert!(matches!(err, PipelineError::NoContentExtracted(_)));
    }

    #[test]
    fn docx_paragraphs_extracted() {
        let xml = concat!(
            r#"<?xml version="1.0"?><w:document xmlns:w="ns">"#,
            "<w:body><w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>",
            "<w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p></w:body></w:document>"
        );

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let text = extract_text(FileKind::Docx, cursor.get_ref(), "doc.docx").unwrap();
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(text.contains('\n'));
    }
}

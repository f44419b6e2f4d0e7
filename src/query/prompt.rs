//! Grounded prompt assembly and insufficiency detection.

use crate::store::SearchHit;

/// Fixed reply when retrieval finds nothing relevant. The generation
/// service is never called in that case.
pub const NO_RELEVANT_INFORMATION: &str =
    "I don't have any relevant information about that in your stored documents.";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using ONLY \
the provided context from the user's stored documents. If the context does not contain enough \
information to answer the question, say that you don't have enough information. Never use \
outside knowledge and never invent facts that are not in the context.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Phrases that signal the model declared its own answer ungrounded.
const INSUFFICIENCY_MARKERS: [&str; 5] = [
    "don't have enough information",
    "do not have enough information",
    "don't have any relevant information",
    "don't know",
    "do not know",
];

/// Concatenate retrieved chunks into a single context block.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}\n{}", i + 1, hit.document_title, hit.chunk.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion: {question}\n\nAnswer using only the context above.")
}

/// True when the generated answer itself declares insufficiency; sources
/// are suppressed for such answers.
pub fn is_insufficient(answer: &str) -> bool {
    let lowered = answer.to_lowercase();
    INSUFFICIENCY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkRecord, SearchHit};
    use uuid::Uuid;

    fn hit(title: &str, content: &str) -> SearchHit {
        SearchHit {
            chunk: ChunkRecord {
                content: content.to_string(),
                owner_id: "u1".to_string(),
                document_id: Uuid::new_v4(),
                chunk_index: 0,
                page: None,
            },
            document_title: title.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn context_includes_titles_and_separators() {
        let hits = vec![hit("Sky Fact", "The sky is blue."), hit("Sea Fact", "The sea is deep.")];
        let context = build_context(&hits);
        assert!(context.contains("[1] Sky Fact"));
        assert!(context.contains("[2] Sea Fact"));
        assert!(context.contains("---"));
    }

    #[test]
    fn insufficiency_detection() {
        assert!(is_insufficient("I don't have enough information to answer that."));
        assert!(is_insufficient("Sorry, I don't know."));
        assert!(is_insufficient("I DO NOT HAVE ENOUGH INFORMATION."));
        assert!(!is_insufficient("The sky is blue."));
    }
}

//! Text chunking.
//!
//! Splits normalized text into overlapping, bounded-size segments. Break
//! points are chosen on a fixed priority ladder: paragraph boundary, then
//! sentence boundary, then any whitespace, then a hard character cut when a
//! single unit exceeds the target size. Offsets into the source text are kept
//! on every chunk so the original can be reconstructed in order.

use serde::{Deserialize, Serialize};

use crate::core::errors::PipelineError;

/// Chunking configuration, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size.
    pub size: usize,
    /// Overlap carried from the previous chunk.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 100,
        }
    }
}

/// One chunk of source text with its char-offset span.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkText {
    pub content: String,
    /// Inclusive char offset of the first character.
    pub start: usize,
    /// Exclusive char offset past the last character.
    pub end: usize,
}

/// Deterministic recursive-boundary splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    size: usize,
    overlap: usize,
}

impl TextSplitter {
    pub fn new(config: ChunkConfig) -> Self {
        let size = config.size.max(1);
        // Invariant: overlap < size, otherwise the cursor cannot advance.
        let overlap = config.overlap.min(size - 1);
        Self { size, overlap }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// Split `text` into ordered overlapping chunks.
    ///
    /// Fails with [`PipelineError::EmptyInput`] for empty or whitespace-only
    /// input. Same input and configuration always produce the same chunks.
    pub fn split(&self, text: &str) -> Result<Vec<ChunkText>, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_end = (start + self.size).min(len);
            let end = if hard_end == len {
                len
            } else {
                find_break(&chars, start, hard_end)
            };

            chunks.push(ChunkText {
                content: chars[start..end].iter().collect(),
                start,
                end,
            });

            if end == len {
                break;
            }

            // Step back by the overlap but always make forward progress.
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        Ok(chunks)
    }
}

/// Pick the best break position in `(start, hard_end]`.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    // Only consider boundaries in the back half of the window so a stray
    // early newline does not produce a tiny chunk.
    let floor = start + (hard_end - start) / 2;

    // Paragraph boundary: position right after "\n\n".
    let mut pos = hard_end;
    while pos > floor.max(start + 2) {
        if chars[pos - 1] == '\n' && chars[pos - 2] == '\n' {
            return pos;
        }
        pos -= 1;
    }

    // Sentence boundary: newline, or ". " / "! " / "? ".
    let mut pos = hard_end;
    while pos > floor.max(start + 2) {
        if chars[pos - 1] == '\n' {
            return pos;
        }
        if chars[pos - 1] == ' ' && matches!(chars[pos - 2], '.' | '!' | '?') {
            return pos;
        }
        pos -= 1;
    }

    // Any whitespace.
    let mut pos = hard_end;
    while pos > start + 1 {
        if chars[pos - 1].is_whitespace() {
            return pos;
        }
        pos -= 1;
    }

    // One indivisible unit longer than the target size: hard cut.
    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(ChunkConfig { size, overlap })
    }

    /// Rebuild the original text from chunk offsets.
    fn reconstruct(text: &str, chunks: &[ChunkText]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut covered = 0usize;
        for chunk in chunks {
            assert!(chunk.start <= covered, "gap before chunk at {}", chunk.start);
            if chunk.end > covered {
                out.extend(&chars[covered..chunk.end]);
                covered = chunk.end;
            }
        }
        out
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = splitter(100, 10).split("   \n  ").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = splitter(1000, 100).split("just a short note").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "just a short note");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn coverage_reconstructs_source() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {i} talks about topic {i} in some detail.\n\n"))
            .collect::<String>();
        let chunks = splitter(200, 40).split(&text).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn chunks_respect_size_bound() {
        let text = "word ".repeat(2000);
        for chunk in splitter(300, 50).split(&text).unwrap() {
            assert!(chunk.content.chars().count() <= 300);
        }
    }

    #[test]
    fn indivisible_unit_gets_hard_cut() {
        let text = "x".repeat(2500);
        let chunks = splitter(1000, 100).split(&text).unwrap();
        assert!(chunks.len() > 2);
        assert_eq!(chunks[0].content.chars().count(), 1000);
        assert_eq!(reconstruct(&text, &chunks), text);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(600), "b".repeat(600));
        let chunks = splitter(1000, 0).split(&text).unwrap();
        assert!(chunks[0].content.ends_with('\n'));
        assert!(!chunks[0].content.contains('b'));
    }

    #[test]
    fn overlap_repeats_previous_tail() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(100);
        let chunks = splitter(400, 80).split(&text).unwrap();
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end, "chunks should overlap");
            assert!(pair[0].end - pair[1].start <= 80);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Sentence one. Sentence two! Sentence three? ".repeat(50);
        let a = splitter(256, 32).split(&text).unwrap();
        let b = splitter(256, 32).split(&text).unwrap();
        assert_eq!(a, b);
    }
}

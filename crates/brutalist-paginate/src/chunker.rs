//! `ResponseChunker` — splits text into boundary-respecting chunks (spec
//! §4.9 "Chunker").

use once_cell::sync::Lazy;
use regex::Regex;

/// Default carry-over between consecutive chunks (chars).
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?][ \t]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub is_complete: bool,
    pub truncated: bool,
    pub original_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub metadata: ChunkMetadata,
}

pub struct ResponseChunker {
    pub limit: usize,
    pub overlap: usize,
}

impl ResponseChunker {
    pub fn new(limit: usize, overlap: usize) -> Self {
        ResponseChunker { limit, overlap }
    }

    /// Split `text` into chunks, never splitting a fenced code block
    /// mid-block. For `text.len() <= limit` exactly one chunk covering
    /// the whole text is returned.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let original_length = text.len();
        if text.len() <= self.limit {
            return vec![Chunk {
                content: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
                metadata: ChunkMetadata {
                    is_complete: true,
                    truncated: false,
                    original_length,
                },
            }];
        }

        let mut chunks = Vec::new();
        let mut pos = 0usize;

        while pos < text.len() {
            let target_end = (pos + self.limit).min(text.len());
            let end = if target_end >= text.len() {
                text.len()
            } else {
                self.find_boundary(text, pos, target_end)
            };

            let content = text[pos..end].to_string();
            let is_complete = end >= text.len();
            chunks.push(Chunk {
                content,
                start_offset: pos,
                end_offset: end,
                metadata: ChunkMetadata {
                    is_complete,
                    truncated: !is_complete,
                    original_length,
                },
            });

            if is_complete {
                break;
            }
            pos = end.saturating_sub(self.overlap).max(pos + 1);
        }

        chunks
    }

    /// Find the best split point within `[start, target]`, extended past
    /// `target` if needed to close an open fenced code block, preferring
    /// paragraph break > sentence boundary > word boundary > hard cut.
    fn find_boundary(&self, text: &str, start: usize, target: usize) -> usize {
        let safe_target = extend_past_open_fence(text, start, target);
        let window = &text[start..safe_target];

        if let Some(pos) = window.rfind("\n\n") {
            return to_char_boundary(text, start + pos + 2);
        }
        if let Some(m) = SENTENCE_BOUNDARY.find_iter(window).last() {
            return to_char_boundary(text, start + m.end());
        }
        if let Some(pos) = window.rfind(char::is_whitespace) {
            return to_char_boundary(text, start + pos + 1);
        }
        to_char_boundary(text, safe_target)
    }
}

fn to_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(text.len())
}

/// If `target` lands inside an open ``` fence (odd number of fences before
/// it), push the boundary out to just past the closing fence.
fn extend_past_open_fence(text: &str, start: usize, target: usize) -> usize {
    let prefix_fences = text[start..target].matches("```").count();
    if prefix_fences % 2 == 0 {
        return target;
    }
    match text[target..].find("```") {
        Some(rel) => {
            let close = target + rel + 3;
            match text[close..].find('\n') {
                Some(nl) => close + nl + 1,
                None => text.len(),
            }
        }
        None => text.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_complete_chunk() {
        let chunker = ResponseChunker::new(100, 10);
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.is_complete);
        assert!(!chunks[0].metadata.truncated);
    }

    #[test]
    fn splits_on_paragraph_boundary_when_available() {
        let text = format!("{}\n\n{}", "a".repeat(50), "b".repeat(50));
        let chunker = ResponseChunker::new(60, 5);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].content.ends_with("\n\n") || !chunks[0].content.contains('b'));
    }

    #[test]
    fn last_chunk_has_is_complete_true() {
        let text = "a".repeat(500);
        let chunker = ResponseChunker::new(100, 10);
        let chunks = chunker.chunk(&text);
        assert!(chunks.last().unwrap().metadata.is_complete);
        assert!(chunks[..chunks.len() - 1].iter().all(|c| !c.metadata.is_complete));
    }

    #[test]
    fn fenced_code_block_is_never_split() {
        let text = format!("intro text here\n\n```\n{}\n```\n\nmore text after the block", "line\n".repeat(40));
        let chunker = ResponseChunker::new(80, 10);
        let chunks = chunker.chunk(&text);
        for c in &chunks {
            let fence_count = c.content.matches("```").count();
            assert_eq!(fence_count % 2, 0, "chunk split inside a fence: {:?}", c.content);
        }
    }

    #[test]
    fn original_length_is_preserved_across_chunks() {
        let text = "a".repeat(300);
        let chunker = ResponseChunker::new(100, 0);
        let chunks = chunker.chunk(&text);
        assert!(chunks.iter().all(|c| c.metadata.original_length == 300));
    }
}

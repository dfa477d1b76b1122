//! Response formatting (spec §6 "Response content"): a single text block
//! with a header (context id, pagination status, token estimate, continue
//! hint) over one chunk of the underlying analysis text.

use brutalist_paginate::{
    create_pagination_metadata, estimate_tokens, format_pagination_status, tokens_to_chars, PaginationParams,
    ResponseChunker, CHUNK_OVERLAP_CHARS,
};

/// Slice `content` starting at `params.offset`, taking the first
/// semantically-bounded chunk up to `params.limit` tokens.
fn take_window(content: &str, params: &PaginationParams) -> (String, usize) {
    let total = content.len();
    let start = params.offset.min(total);
    if start >= total {
        return (String::new(), 0);
    }
    let limit_chars = tokens_to_chars(params.limit);
    let chunker = ResponseChunker::new(limit_chars, CHUNK_OVERLAP_CHARS);
    let window = chunker.chunk(&content[start..]).into_iter().next().expect("chunk() always yields at least one chunk");
    let len = window.content.len();
    (window.content, len)
}

/// Build the final text block handed back to the MCP client.
pub fn format_response(
    content: &str,
    params: &PaginationParams,
    context_id: Option<&str>,
    verbose: bool,
    execution_summary: Option<&str>,
) -> String {
    let total = content.len();
    let (chunk_content, chunk_size) = take_window(content, params);
    let meta = create_pagination_metadata(total, params, chunk_size, None, None);
    let status = format_pagination_status(&meta);

    let mut header = String::from("# Brutalist Analysis Results\n\n");
    if let Some(ctx) = context_id {
        header.push_str(&format!("Context ID: {ctx}\n"));
    }
    header.push_str(&format!("Pagination Status: {status}\n"));
    header.push_str(&format!("Token Estimate: ~{} tokens\n", estimate_tokens(&chunk_content)));
    if meta.has_more {
        let next_offset = params.offset + chunk_size;
        match context_id {
            Some(ctx) => header.push_str(&format!("Continue Reading: offset={next_offset}, context_id={ctx}\n")),
            None => header.push_str(&format!("Continue Reading: offset={next_offset}\n")),
        }
    }
    if verbose {
        if let Some(summary) = execution_summary {
            header.push_str(&format!("\n## Execution Summary\n{summary}\n"));
        }
    }

    let mut footer = format!("\n\n---\nChunk {} of {}", meta.chunk_index + 1, meta.total_chunks.max(1));
    if !meta.has_more {
        footer.push_str(&format!(" • {total} characters total"));
    }

    format!("{header}\n{chunk_content}{footer}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use brutalist_paginate::DEFAULT_LIMIT_TOKENS;

    fn params(offset: usize, limit: usize) -> PaginationParams {
        PaginationParams { offset, limit, cursor: None }
    }

    #[test]
    fn short_response_has_no_continue_hint() {
        let text = format_response("hello world", &params(0, DEFAULT_LIMIT_TOKENS), Some("ctx-1"), false, None);
        assert!(text.contains("# Brutalist Analysis Results"));
        assert!(text.contains("Context ID: ctx-1"));
        assert!(!text.contains("Continue Reading"));
        assert!(text.contains("hello world"));
    }

    #[test]
    fn long_response_includes_continue_hint_with_next_offset() {
        let big = "word ".repeat(50_000);
        let text = format_response(&big, &params(0, 1000), Some("ctx-2"), false, None);
        assert!(text.contains("Continue Reading: offset="));
        assert!(text.contains("context_id=ctx-2"));
    }

    #[test]
    fn verbose_appends_execution_summary() {
        let text = format_response("hi", &params(0, DEFAULT_LIMIT_TOKENS), None, true, Some("claude: 1.2s, codex: 2.0s"));
        assert!(text.contains("## Execution Summary"));
        assert!(text.contains("claude: 1.2s"));
    }

    #[test]
    fn non_verbose_omits_execution_summary_even_if_present() {
        let text = format_response("hi", &params(0, DEFAULT_LIMIT_TOKENS), None, false, Some("should not appear"));
        assert!(!text.contains("should not appear"));
    }
}

//! Paginator — token-budget pagination over chunked text (spec §4.9).

use serde_json::Value;

pub const MIN_LIMIT_TOKENS: usize = 1_000;
pub const MAX_LIMIT_TOKENS: usize = 100_000;
pub const DEFAULT_LIMIT_TOKENS: usize = 22_500;
pub const CHUNK_OVERLAP_CHARS: usize = 200;
pub const CHUNK_OVERLAP_TOKENS: usize = 50;

/// If the to-be-returned text exceeds this many estimated tokens, the Tool
/// Handler must paginate even when the caller didn't ask for it.
pub const AUTO_PAGINATION_TOKEN_THRESHOLD: usize = 25_000;

const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens * CHARS_PER_TOKEN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationParams {
    pub offset: usize,
    pub limit: usize,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsedCursor {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Accepts `"offset:<int>"` or a JSON object with numeric `offset`/`limit`.
/// Never throws — malformed input yields an empty [`ParsedCursor`].
pub fn parse_cursor(cursor: &str) -> ParsedCursor {
    if let Some(rest) = cursor.strip_prefix("offset:") {
        if let Ok(offset) = rest.parse::<usize>() {
            return ParsedCursor {
                offset: Some(offset),
                limit: None,
            };
        }
        return ParsedCursor::default();
    }

    match serde_json::from_str::<Value>(cursor) {
        Ok(Value::Object(map)) => ParsedCursor {
            offset: map.get("offset").and_then(Value::as_u64).map(|v| v as usize),
            limit: map.get("limit").and_then(Value::as_u64).map(|v| v as usize),
        },
        _ => ParsedCursor::default(),
    }
}

/// Clamp caller-supplied pagination args into valid ranges; non-numeric
/// inputs are ignored rather than rejected (spec §4.9).
pub fn extract_pagination_params(
    offset: Option<i64>,
    limit: Option<i64>,
    cursor: Option<&str>,
) -> PaginationParams {
    let mut offset_val = offset.filter(|v| *v >= 0).map(|v| v as usize).unwrap_or(0);
    let mut limit_tokens = limit
        .map(|v| (v.max(0) as usize).clamp(MIN_LIMIT_TOKENS, MAX_LIMIT_TOKENS))
        .unwrap_or(DEFAULT_LIMIT_TOKENS);

    if let Some(c) = cursor {
        let parsed = parse_cursor(c);
        if let Some(o) = parsed.offset {
            offset_val = o;
        }
        if let Some(l) = parsed.limit {
            limit_tokens = l.clamp(MIN_LIMIT_TOKENS, MAX_LIMIT_TOKENS);
        }
    }

    PaginationParams {
        offset: offset_val,
        limit: limit_tokens,
        cursor: cursor.map(|s| s.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationMetadata {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// `total` and `chunk_size` are char counts; `chunks`/`index` let a caller
/// that already computed the full chunk set report its real position
/// (otherwise a single-window view relative to `params` is assumed).
pub fn create_pagination_metadata(
    total: usize,
    params: &PaginationParams,
    chunk_size: usize,
    chunks: Option<usize>,
    index: Option<usize>,
) -> PaginationMetadata {
    let end_offset = params.offset + chunk_size;
    let has_more = end_offset < total;
    let next_cursor = has_more.then(|| format!("offset:{end_offset}"));
    PaginationMetadata {
        total,
        offset: params.offset,
        limit: params.limit,
        has_more,
        next_cursor,
        chunk_index: index.unwrap_or(0),
        total_chunks: chunks.unwrap_or(1),
    }
}

/// Canonical one-liner surfaced in tool responses (spec §4.9).
pub fn format_pagination_status(meta: &PaginationMetadata) -> String {
    if meta.total_chunks <= 1 && !meta.has_more {
        return format!("Complete response ({} characters)", meta.total);
    }
    let start = meta.offset;
    let end = (meta.offset + meta.limit.min(meta.total.saturating_sub(meta.offset))).min(meta.total);
    if meta.has_more {
        format!(
            "Part {}/{}: chars {}-{} of {} • Use offset parameter to continue",
            meta.chunk_index + 1,
            meta.total_chunks,
            start,
            end,
            meta.total
        )
    } else {
        format!(
            "Part {}/{}: chars {}-{} of {} • Complete",
            meta.chunk_index + 1,
            meta.total_chunks,
            start,
            end,
            meta.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cursor_offset_form() {
        assert_eq!(
            parse_cursor("offset:42"),
            ParsedCursor {
                offset: Some(42),
                limit: None
            }
        );
    }

    #[test]
    fn parse_cursor_json_form() {
        assert_eq!(
            parse_cursor(r#"{"offset": 5, "limit": 2000}"#),
            ParsedCursor {
                offset: Some(5),
                limit: Some(2000)
            }
        );
    }

    #[test]
    fn parse_cursor_malformed_is_empty_not_an_error() {
        assert_eq!(parse_cursor("garbage"), ParsedCursor::default());
    }

    #[test]
    fn extract_params_clamps_limit_into_range() {
        let p = extract_pagination_params(None, Some(999_999_999), None);
        assert_eq!(p.limit, MAX_LIMIT_TOKENS);
        let p = extract_pagination_params(None, Some(1), None);
        assert_eq!(p.limit, MIN_LIMIT_TOKENS);
    }

    #[test]
    fn extract_params_ignores_negative_offset() {
        let p = extract_pagination_params(Some(-5), None, None);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn cursor_overrides_explicit_offset() {
        let p = extract_pagination_params(Some(0), None, Some("offset:99"));
        assert_eq!(p.offset, 99);
    }

    #[test]
    fn single_page_status_is_complete() {
        let params = PaginationParams { offset: 0, limit: DEFAULT_LIMIT_TOKENS, cursor: None };
        let meta = create_pagination_metadata(100, &params, 100, Some(1), Some(0));
        assert_eq!(format_pagination_status(&meta), "Complete response (100 characters)");
    }

    #[test]
    fn intermediate_page_status_invites_continuation() {
        let params = PaginationParams { offset: 0, limit: 1000, cursor: None };
        let meta = create_pagination_metadata(5000, &params, 1000, Some(5), Some(0));
        let status = format_pagination_status(&meta);
        assert!(status.contains("Use offset parameter to continue"));
        assert_eq!(meta.next_cursor.as_deref(), Some("offset:1000"));
    }

    #[test]
    fn final_page_status_says_complete() {
        let params = PaginationParams { offset: 4000, limit: 1000, cursor: None };
        let meta = create_pagination_metadata(5000, &params, 1000, Some(5), Some(4));
        let status = format_pagination_status(&meta);
        assert!(status.ends_with("Complete"));
        assert!(!meta.has_more);
    }

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcd"), 1);
    }
}

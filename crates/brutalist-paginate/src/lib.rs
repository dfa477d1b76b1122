//! Response Chunker & Paginator (spec §4.9): semantic-boundary text
//! splitting plus token-budget pagination over the final joined output of
//! an analysis.

pub mod chunker;
pub mod paginator;

pub use chunker::{Chunk, ChunkMetadata, ResponseChunker, DEFAULT_OVERLAP_CHARS};
pub use paginator::{
    create_pagination_metadata, estimate_tokens, extract_pagination_params, format_pagination_status,
    parse_cursor, tokens_to_chars, PaginationMetadata, PaginationParams, ParsedCursor,
    AUTO_PAGINATION_TOKEN_THRESHOLD, CHUNK_OVERLAP_CHARS, CHUNK_OVERLAP_TOKENS, DEFAULT_LIMIT_TOKENS,
    MAX_LIMIT_TOKENS, MIN_LIMIT_TOKENS,
};

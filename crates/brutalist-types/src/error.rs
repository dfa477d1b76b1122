// Error taxonomy exposed to MCP clients (spec §7).
//
// These are categories of *user-visible* failure, not an exhaustive list of
// every internal error — internal causes are wrapped into the closest
// matching variant (or `Generic`) at the boundary where they are classified.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrutalistError {
    #[error("Analysis timed out — try reducing scope or increasing timeout")]
    Timeout,

    #[error("Target path not found — verify the path exists and is accessible")]
    PathNotFound,

    #[error("Permission denied — check file access")]
    Permission,

    #[error("No CLI agents available for analysis")]
    NoClisAvailable,

    #[error("Cannot be used from within a brutalist-spawned CLI subprocess")]
    Recursion,

    #[error("{0}")]
    MissingContext(String),

    #[error("Analysis failed due to internal error")]
    Generic,
}

impl BrutalistError {
    /// `resume=true` without a `context_id`.
    pub fn resume_requires_context_id() -> Self {
        Self::MissingContext(
            "The 'resume' flag requires a 'context_id' from a previous response — \
             call without 'resume' first to obtain one."
                .to_string(),
        )
    }

    /// `context_id` supplied but not found in the cache (or session mismatch).
    pub fn context_id_not_found() -> Self {
        Self::MissingContext(
            "Context ID not found. It may have expired or belong to a different session."
                .to_string(),
        )
    }
}

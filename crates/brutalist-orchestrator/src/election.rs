//! Election policy (spec §4.2): which CLI agents actually run for a given
//! request.

use brutalist_types::{BrutalistError, CliAgent};

/// Environment variables each host CLI is documented to set in its own
/// subprocess environment — used to infer which CLI (if any) is currently
/// hosting this MCP server, so it can be excluded from the candidate set.
///
/// This is a product decision (spec §4.2 step 1 only says "environment
/// hints"; see DESIGN.md) rather than a documented cross-vendor contract.
const CLAUDE_CODE_MARKER: &str = "CLAUDECODE";
const CODEX_MARKER: &str = "CODEX_SANDBOX";
const GEMINI_MARKER: &str = "GEMINI_CLI";

/// Detect which CLI (if any) is currently hosting this process, so it can be
/// excluded from the candidate set to prevent recursion.
pub fn current_cli() -> Option<CliAgent> {
    if std::env::var_os(CLAUDE_CODE_MARKER).is_some() {
        return Some(CliAgent::Claude);
    }
    if std::env::var_os(CODEX_MARKER).is_some() {
        return Some(CliAgent::Codex);
    }
    if std::env::var_os(GEMINI_MARKER).is_some() {
        return Some(CliAgent::Gemini);
    }
    None
}

/// Choose the agents that will actually run for this request (spec §4.2
/// "Election policy").
///
/// `requested` is the caller's `clis=[...]` preference, if any.
/// `available` is the full probed-available set. `current` is the CLI
/// hosting this process, if detected — always excluded.
pub fn elect(
    requested: Option<&[CliAgent]>,
    available: &[CliAgent],
    current: Option<CliAgent>,
) -> Result<Vec<CliAgent>, BrutalistError> {
    let candidates: Vec<CliAgent> = available
        .iter()
        .copied()
        .filter(|a| Some(*a) != current)
        .collect();

    let selected = match requested {
        Some(prefs) if !prefs.is_empty() => {
            let honored: Vec<CliAgent> = prefs
                .iter()
                .copied()
                .filter(|a| candidates.contains(a))
                .collect();
            if honored.is_empty() {
                candidates
            } else {
                honored
            }
        }
        _ => candidates,
    };

    if selected.is_empty() {
        return Err(BrutalistError::NoClisAvailable);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honors_caller_preference_when_available() {
        let selected = elect(
            Some(&[CliAgent::Codex]),
            &[CliAgent::Claude, CliAgent::Codex, CliAgent::Gemini],
            None,
        )
        .unwrap();
        assert_eq!(selected, vec![CliAgent::Codex]);
    }

    #[test]
    fn excludes_current_cli_even_if_requested() {
        let selected = elect(
            Some(&[CliAgent::Claude, CliAgent::Codex]),
            &[CliAgent::Claude, CliAgent::Codex],
            Some(CliAgent::Claude),
        )
        .unwrap();
        assert_eq!(selected, vec![CliAgent::Codex]);
    }

    #[test]
    fn falls_back_to_all_available_when_no_preference() {
        let selected = elect(None, &[CliAgent::Claude, CliAgent::Gemini], None).unwrap();
        assert_eq!(selected, vec![CliAgent::Claude, CliAgent::Gemini]);
    }

    #[test]
    fn falls_back_to_all_available_when_preference_entirely_unavailable() {
        let selected = elect(Some(&[CliAgent::Codex]), &[CliAgent::Claude], None).unwrap();
        assert_eq!(selected, vec![CliAgent::Claude]);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let result = elect(None, &[], None);
        assert_eq!(result, Err(BrutalistError::NoClisAvailable));
    }

    #[test]
    fn no_candidates_after_excluding_current_is_an_error() {
        let result = elect(None, &[CliAgent::Claude], Some(CliAgent::Claude));
        assert_eq!(result, Err(BrutalistError::NoClisAvailable));
    }
}

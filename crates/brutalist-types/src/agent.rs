use serde::{Deserialize, Serialize};

/// One of the three supported external CLI critics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliAgent {
    Claude,
    Codex,
    Gemini,
}

impl CliAgent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CliAgent::Claude => "claude",
            CliAgent::Codex => "codex",
            CliAgent::Gemini => "gemini",
        }
    }

    pub fn all() -> [CliAgent; 3] {
        [CliAgent::Claude, CliAgent::Codex, CliAgent::Gemini]
    }

    /// Parse from the tool's `clis` argument or a `currentCLI` environment hint.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Some(CliAgent::Claude),
            "codex" => Some(CliAgent::Codex),
            "gemini" => Some(CliAgent::Gemini),
            _ => None,
        }
    }
}

impl std::fmt::Display for CliAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(CliAgent::parse("Claude"), Some(CliAgent::Claude));
        assert_eq!(CliAgent::parse("CODEX"), Some(CliAgent::Codex));
    }

    #[test]
    fn parse_unknown_is_none() {
        assert_eq!(CliAgent::parse("chatgpt"), None);
    }

    #[test]
    fn all_contains_three_distinct_agents() {
        let all = CliAgent::all();
        assert_eq!(all.len(), 3);
        assert_ne!(all[0], all[1]);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(CliAgent::Gemini.to_string(), "gemini");
    }
}

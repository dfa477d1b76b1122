use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a cached conversation (spec §3 `ConversationMessage`).
///
/// History is append-only and preserved verbatim; strict role alternation
/// is not enforced (spec note: "not required, but history preserved
/// verbatim").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_expected_role() {
        let now = Utc::now();
        assert_eq!(ConversationMessage::user("hi", now).role, Role::User);
        assert_eq!(
            ConversationMessage::assistant("hi", now).role,
            Role::Assistant
        );
    }
}

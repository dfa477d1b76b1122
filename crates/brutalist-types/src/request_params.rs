use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Argument field names that never participate in the cache key — they
/// control *retrieval*, not the content that would be produced (spec §4.8).
pub const NON_CACHE_FIELDS: &[&str] = &[
    "context_id",
    "resume",
    "offset",
    "limit",
    "cursor",
    "force_refresh",
];

/// A tool invocation's cache-relevant arguments.
///
/// Stored as a `BTreeMap` so serialization is always key-ordered —
/// `cache_key()` is deterministic regardless of the order fields arrived in
/// the original JSON (spec §3 invariant: "deterministic serialization
/// (stable key ordering)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub tool: String,
    pub args: BTreeMap<String, Value>,
}

impl RequestParams {
    /// Build from a raw tool-call arguments object, keeping only fields that
    /// are relevant to cache identity (i.e. dropping pagination/continuation
    /// fields, and any field whose value is `null`).
    pub fn from_args(tool: &str, raw_args: &Value) -> Self {
        let mut args = BTreeMap::new();
        if let Value::Object(map) = raw_args {
            for (k, v) in map {
                if NON_CACHE_FIELDS.contains(&k.as_str()) || v.is_null() {
                    continue;
                }
                args.insert(k.clone(), v.clone());
            }
        }
        RequestParams {
            tool: tool.to_string(),
            args,
        }
    }

    /// Deterministic hash-based cache key. `serde_json` on a `BTreeMap`
    /// always emits keys in sorted order, so the digest is stable across
    /// calls regardless of argument insertion order.
    pub fn cache_key(&self) -> String {
        let canonical =
            serde_json::to_vec(self).expect("RequestParams serialization cannot fail");
        let digest = sha2::Sha256::digest(&canonical);
        hex::encode(digest)
    }

    /// The value of the tool's primary argument, if present.
    pub fn primary_arg(&self, field: &str) -> Option<&str> {
        self.args.get(field).and_then(|v| v.as_str())
    }
}

use sha2::Digest;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_is_order_independent() {
        let a = RequestParams::from_args(
            "roast_codebase",
            &json!({"targetPath": "/x", "depth": 2}),
        );
        let b = RequestParams::from_args(
            "roast_codebase",
            &json!({"depth": 2, "targetPath": "/x"}),
        );
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn pagination_fields_excluded_from_key() {
        let a = RequestParams::from_args("roast_idea", &json!({"idea": "x"}));
        let b = RequestParams::from_args(
            "roast_idea",
            &json!({"idea": "x", "offset": 10, "context_id": "abc", "resume": true}),
        );
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn different_tool_names_differ() {
        let a = RequestParams::from_args("roast_idea", &json!({"idea": "x"}));
        let b = RequestParams::from_args("roast_security", &json!({"idea": "x"}));
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn null_values_are_dropped() {
        let a = RequestParams::from_args("roast_idea", &json!({"idea": "x"}));
        let b = RequestParams::from_args("roast_idea", &json!({"idea": "x", "claims": null}));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn primary_arg_reads_back() {
        let p = RequestParams::from_args("roast_idea", &json!({"idea": "hello"}));
        assert_eq!(p.primary_arg("idea"), Some("hello"));
    }
}

//! Response Cache — dual-keyed (cacheKey / contextId) store with gzip
//! compression above a size threshold and conversation continuation
//! support (spec §4.8).

use std::collections::HashMap;
use std::io::{Read, Write};

use brutalist_types::{ConversationMessage, RequestParams};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use uuid::Uuid;

/// Literal session id anonymous (no client-provided session) requests
/// share, so pagination still works without a client session.
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// TTL from last write.
pub const DEFAULT_TTL: chrono::Duration = chrono::Duration::hours(2);

/// Compress content above this size.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("context id {0} not found")]
    NotFound(String),
    #[error("Session mismatch")]
    SessionMismatch,
}

struct CacheEntry {
    context_id: String,
    session_id: String,
    bytes: Vec<u8>,
    compressed: bool,
    request_params: RequestParams,
    conversation_history: Vec<ConversationMessage>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn decompressed_content(&self) -> String {
        if self.compressed {
            let mut decoder = GzDecoder::new(self.bytes.as_slice());
            let mut out = String::new();
            decoder
                .read_to_string(&mut out)
                .expect("gzip entry must decode");
            out
        } else {
            String::from_utf8_lossy(&self.bytes).into_owned()
        }
    }
}

fn encode(content: &str) -> (Vec<u8>, bool) {
    if content.len() > COMPRESSION_THRESHOLD_BYTES {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).expect("gzip encode cannot fail");
        (encoder.finish().expect("gzip finish cannot fail"), true)
    } else {
        (content.as_bytes().to_vec(), false)
    }
}

pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    cache_key_to_context: HashMap<String, String>,
    ttl: chrono::Duration,
}

impl ResponseCache {
    pub fn new() -> Self {
        ResponseCache {
            entries: HashMap::new(),
            cache_key_to_context: HashMap::new(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn get(&mut self, cache_key: &str, session_id: &str, now: DateTime<Utc>) -> Option<String> {
        let context_id = self.cache_key_to_context.get(cache_key)?.clone();
        self.get_by_context_id(&context_id, session_id, now)
    }

    pub fn get_by_context_id(
        &mut self,
        context_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let expired = match self.entries.get(context_id) {
            Some(entry) => entry.is_expired(now),
            None => return None,
        };
        if expired {
            self.entries.remove(context_id);
            return None;
        }
        let entry = self.entries.get(context_id)?;
        if entry.session_id != session_id {
            return None;
        }
        Some(entry.decompressed_content())
    }

    /// Write a fresh entry (or a re-keyed entry, when `existing_cache_key`
    /// is supplied) and return its minted `contextId`.
    pub fn set(
        &mut self,
        request_params: RequestParams,
        content: &str,
        existing_cache_key: Option<&str>,
        session_id: &str,
        conversation_history: Vec<ConversationMessage>,
        now: DateTime<Utc>,
    ) -> String {
        let cache_key = existing_cache_key
            .map(|s| s.to_string())
            .unwrap_or_else(|| request_params.cache_key());
        let context_id = Uuid::new_v4().to_string();
        let (bytes, compressed) = encode(content);

        self.entries.insert(
            context_id.clone(),
            CacheEntry {
                context_id: context_id.clone(),
                session_id: session_id.to_string(),
                bytes,
                compressed,
                request_params,
                conversation_history,
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        self.cache_key_to_context.insert(cache_key, context_id.clone());
        context_id
    }

    pub fn update_by_context_id(
        &mut self,
        context_id: &str,
        new_content: &str,
        new_history: Vec<ConversationMessage>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let entry = self
            .entries
            .get_mut(context_id)
            .ok_or_else(|| CacheError::NotFound(context_id.to_string()))?;
        if entry.session_id != session_id {
            return Err(CacheError::SessionMismatch);
        }
        let (bytes, compressed) = encode(new_content);
        entry.bytes = bytes;
        entry.compressed = compressed;
        entry.conversation_history = new_history;
        entry.expires_at = now + self.ttl;
        Ok(())
    }

    pub fn find_context_id_for_key(&self, cache_key: &str) -> Option<&str> {
        self.cache_key_to_context.get(cache_key).map(|s| s.as_str())
    }

    pub fn create_alias(&mut self, context_id: &str, cache_key: &str) -> Result<(), CacheError> {
        if !self.entries.contains_key(context_id) {
            return Err(CacheError::NotFound(context_id.to_string()));
        }
        self.cache_key_to_context.insert(cache_key.to_string(), context_id.to_string());
        Ok(())
    }

    pub fn request_params(&self, context_id: &str) -> Option<&RequestParams> {
        self.entries.get(context_id).map(|e| &e.request_params)
    }

    pub fn conversation_history(&self, context_id: &str) -> Option<&[ConversationMessage]> {
        self.entries.get(context_id).map(|e| e.conversation_history.as_slice())
    }

    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for id in expired {
            self.entries.remove(&id);
            self.cache_key_to_context.retain(|_, v| v != &id);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry and alias. Used on server shutdown — there is no
    /// persistence to preserve (spec Non-goal), so there is nothing to flush
    /// first.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cache_key_to_context.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> RequestParams {
        RequestParams::from_args("roast_idea", &json!({"idea": "x"}))
    }

    #[test]
    fn set_then_get_round_trips_content() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello world", None, "s1", vec![], now);
        assert_eq!(cache.get_by_context_id(&ctx, "s1", now), Some("hello world".to_string()));
    }

    #[test]
    fn get_enforces_session_match() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello", None, "s1", vec![], now);
        assert_eq!(cache.get_by_context_id(&ctx, "s2", now), None);
    }

    #[test]
    fn cache_key_lookup_resolves_through_context() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let p = params();
        let key = p.cache_key();
        cache.set(p, "hello", None, "s1", vec![], now);
        assert_eq!(cache.get(&key, "s1", now), Some("hello".to_string()));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello", None, "s1", vec![], now);
        let later = now + DEFAULT_TTL + chrono::Duration::seconds(1);
        assert_eq!(cache.get_by_context_id(&ctx, "s1", later), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn update_rejects_session_mismatch() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello", None, "s1", vec![], now);
        assert_eq!(
            cache.update_by_context_id(&ctx, "new", vec![], "s2", now),
            Err(CacheError::SessionMismatch)
        );
    }

    #[test]
    fn update_preserves_created_at_and_refreshes_expiry() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello", None, "s1", vec![], now);
        let later = now + chrono::Duration::minutes(30);
        cache.update_by_context_id(&ctx, "updated", vec![], "s1", later).unwrap();
        assert_eq!(cache.get_by_context_id(&ctx, "s1", later), Some("updated".to_string()));
    }

    #[test]
    fn large_content_is_compressed_and_decompresses_correctly() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let big = "x".repeat(COMPRESSION_THRESHOLD_BYTES + 1024);
        let ctx = cache.set(params(), &big, None, "s1", vec![], now);
        assert_eq!(cache.get_by_context_id(&ctx, "s1", now), Some(big));
    }

    #[test]
    fn create_alias_points_new_key_at_existing_context() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let ctx = cache.set(params(), "hello", None, "s1", vec![], now);
        cache.create_alias(&ctx, "other-key").unwrap();
        assert_eq!(cache.find_context_id_for_key("other-key"), Some(ctx.as_str()));
    }

    #[test]
    fn create_alias_fails_for_missing_context() {
        let mut cache = ResponseCache::new();
        assert!(cache.create_alias("missing", "key").is_err());
    }

    #[test]
    fn clear_drops_all_entries_and_aliases() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let p = params();
        let key = p.cache_key();
        cache.set(p, "hello", None, "s1", vec![], now);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.find_context_id_for_key(&key), None);
    }

    #[test]
    fn sweep_expired_removes_stale_entries_and_aliases() {
        let mut cache = ResponseCache::new();
        let now = Utc::now();
        let p = params();
        let key = p.cache_key();
        cache.set(p, "hello", None, "s1", vec![], now);
        let later = now + DEFAULT_TTL + chrono::Duration::seconds(1);
        assert_eq!(cache.sweep_expired(later), 1);
        assert_eq!(cache.find_context_id_for_key(&key), None);
    }
}

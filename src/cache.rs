//! Per-request cache of full-value encodings, LRU-bounded

use crate::error::Result;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub index: String,
    pub doc_type: String,
    pub field: String,
    pub content_hash: u64,
    pub spans_hash: u64,
}

impl CacheKey {
    /// Key for `content` encoded with no highlighted spans.
    pub fn new(index: &str, doc_type: &str, field: &str, content: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            field: field.to_string(),
            content_hash: hasher.finish(),
            spans_hash: spans_hash(std::iter::empty()),
        }
    }

    /// Same content under a different span set encodes differently.
    pub fn with_spans<'s>(mut self, spans: impl IntoIterator<Item = &'s str>) -> Self {
        self.spans_hash = spans_hash(spans);
        self
    }
}

/// Order-independent hash of a span set.
fn spans_hash<'s>(spans: impl IntoIterator<Item = &'s str>) -> u64 {
    let mut sorted: Vec<&str> = spans.into_iter().collect();
    sorted.sort_unstable();
    let mut hasher = DefaultHasher::new();
    sorted.hash(&mut hasher);
    hasher.finish()
}

/// Lives for one request only; never shared across requests or threads.
pub struct ResultCache {
    cache: LruCache<CacheKey, String>,
    hits: usize,
    misses: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<&String> {
        let found = self.cache.get(key);
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn put(&mut self, key: CacheKey, encoded: String) {
        self.cache.put(key, encoded);
    }

    /// Returns the cached encoding for `key`, running `encode` on a miss.
    /// Failed encodings are not cached.
    pub fn get_or_try_insert<F>(&mut self, key: CacheKey, encode: F) -> Result<String>
    where
        F: FnOnce() -> Result<String>,
    {
        if let Some(encoded) = self.get(&key) {
            return Ok(encoded.clone());
        }
        let encoded = encode()?;
        self.cache.put(key, encoded.clone());
        Ok(encoded)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// `(hits, misses, len, capacity)`
    pub fn stats(&self) -> (usize, usize, usize, usize) {
        (self.hits, self.misses, self.cache.len(), self.cache.cap().get())
    }
}

//! LRU cache for compiled regular expressions
//!
//! `matches()` and `extract()` receive their patterns as strings on every
//! evaluation; caching the compiled form keeps repeated checks cheap.

use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 256;

static SHARED: Lazy<RegexCache> = Lazy::new(|| RegexCache::new(DEFAULT_CAPACITY));

/// Thread-safe LRU cache of compiled patterns
pub struct RegexCache {
    cache: Mutex<LruCache<String, Regex>>,
}

impl RegexCache {
    /// Create a new cache with given capacity (at least one entry)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RegexCache {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Process-wide cache used by the evaluator
    pub fn shared() -> &'static RegexCache {
        &SHARED
    }

    /// Get a compiled pattern, compiling and caching it on a miss
    pub fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(regex) = self.cache.lock().get(pattern) {
            return Ok(regex.clone());
        }

        // Compile outside the lock; a racing compile of the same pattern is harmless
        let regex = Regex::new(pattern)?;
        self.cache.lock().put(pattern.to_string(), regex.clone());
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

use lru::LruCache;
use parking_lot::RwLock;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    timestamp: u64,
    ttl: u64,
}

/// Short-lived response cache keyed by a hash of the request. Used by
/// `VisionClient` to avoid re-querying the model for an unchanged scene
/// within a short window; the reasoning path does not use it (each call is
/// contextual on the current observation history, so caching would return
/// stale decisions).
pub struct ResponseCache {
    cache: Arc<RwLock<LruCache<u64, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, 10_000);
        let capacity = NonZeroUsize::new(capacity).expect("capacity clamped to >= 1");
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if key.len() > 10_000 {
            return None;
        }
        let hash = Self::hash_key(key);
        let mut cache = self.cache.write();
        if let Some(entry) = cache.get(&hash) {
            let now = now_secs();
            if entry.timestamp > now {
                cache.pop(&hash);
                return None;
            }
            let age = now.saturating_sub(entry.timestamp);
            if age < entry.ttl {
                return Some(entry.response.clone());
            }
            cache.pop(&hash);
        }
        None
    }

    pub fn set(&self, key: &str, response: String, ttl: u64) {
        if key.len() > 10_000 || response.len() > 1_000_000 {
            tracing::warn!("cache entry too large, skipping");
            return;
        }
        let ttl = ttl.min(86_400 * 7);
        let hash = Self::hash_key(key);
        let entry = CacheEntry {
            response,
            timestamp: now_secs(),
            ttl,
        };
        self.cache.write().put(hash, entry);
    }

    fn hash_key(key: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_ttl() {
        let cache = ResponseCache::new(4);
        cache.set("k", "v".to_string(), 60);
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn rejects_oversized_entries() {
        let cache = ResponseCache::new(4);
        let huge = "x".repeat(1_000_001);
        cache.set("k", huge, 60);
        assert_eq!(cache.get("k"), None);
    }
}

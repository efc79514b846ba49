use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry {
    embedding: Vec<f32>,
    expires_at: Instant,
}

/// In-process TTL cache for query embeddings.
///
/// Strictly advisory: a miss falls through to the provider, a hit skips
/// it. Entries are copied on get/set so callers never share buffers with
/// the cache.
pub struct QueryEmbeddingCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl QueryEmbeddingCache {
    /// Default TTL is 24 hours.
    pub fn new(ttl: Duration) -> Self {
        QueryEmbeddingCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, query_text: &str) -> Option<Vec<f32>> {
        let expired = match self.entries.get(query_text) {
            None => return None,
            Some(entry) => {
                if entry.expires_at > Instant::now() {
                    return Some(entry.embedding.clone());
                }
                true
            }
        };

        if expired {
            self.entries.remove(query_text);
        }
        None
    }

    pub fn set(&self, query_text: &str, embedding: &[f32]) {
        self.entries.insert(
            query_text.to_string(),
            CacheEntry {
                embedding: embedding.to_vec(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(86_400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = QueryEmbeddingCache::default();
        assert!(cache.get("what is rust?").is_none());

        cache.set("what is rust?", &[0.1, 0.2]);
        assert_eq!(cache.get("what is rust?"), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache = QueryEmbeddingCache::new(Duration::from_millis(0));
        cache.set("q", &[1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("q").is_none());
    }

    #[test]
    fn get_returns_a_copy() {
        let cache = QueryEmbeddingCache::default();
        cache.set("q", &[1.0, 2.0]);
        let mut copy = cache.get("q").unwrap();
        copy[0] = 99.0;
        assert_eq!(cache.get("q"), Some(vec![1.0, 2.0]));
    }
}

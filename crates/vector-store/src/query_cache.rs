use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 256;

/// LRU of query text → query embedding, scoped to one model
#[derive(Debug)]
pub struct QueryCache {
    model_id: String,
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryCache {
    pub fn new(model_id: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            model_id: model_id.into(),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
            .cloned()
    }

    pub fn put(&self, query: &str, vector: Vec<f32>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(query.to_string(), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn evicts_least_recently_used() {
        let cache = QueryCache::new("m", 2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        cache.put("c", vec![3.0]);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_still_caches_one() {
        let cache = QueryCache::new("m", 0);
        cache.put("a", vec![1.0]);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
    }
}

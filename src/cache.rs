//! Memo cache for compiled expressions.
//!
//! An explicit object owned by the compiler that uses it, never
//! process-global. Eviction is bounded least-recently-used; within one
//! compiler instance an identical input is compiled once and always
//! returns the identical output.

use std::collections::HashMap;

pub(crate) const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct ExprCache {
    entries: HashMap<String, (u64, String)>,
    capacity: usize,
    clock: u64,
}

impl Default for ExprCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ExprCache {
    /// A cache holding at most `capacity` compiled expressions. A zero
    /// capacity disables memoisation entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&mut self, expr: &str) -> Option<String> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(expr).map(|(stamp, code)| {
            *stamp = clock;
            code.clone()
        })
    }

    pub(crate) fn insert(&mut self, expr: &str, code: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(expr) {
            self.evict_oldest();
        }
        self.clock += 1;
        self.entries
            .insert(expr.to_string(), (self.clock, code.to_string()));
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, (stamp, _))| *stamp)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            tracing::trace!("evicting memoised expression '{}'", key);
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_hit_returns_cached_code() {
        let mut cache = ExprCache::new(4);
        cache.insert("a + b", "tal_plus($a, $b)");
        assert_eq!(cache.get("a + b"), Some("tal_plus($a, $b)".to_string()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_eviction_drops_least_recently_used() {
        let mut cache = ExprCache::new(2);
        cache.insert("a", "$a");
        cache.insert("b", "$b");
        // Touch "a" so "b" is the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.insert("c", "$c");
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_zero_capacity_disables_memoisation() {
        let mut cache = ExprCache::new(0);
        cache.insert("a", "$a");
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_reinsert_existing_key_does_not_evict() {
        let mut cache = ExprCache::new(2);
        cache.insert("a", "$a");
        cache.insert("b", "$b");
        cache.insert("a", "$a");
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_some());
    }
}

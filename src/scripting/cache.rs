//! Bounded, time-expiring key/value cache owned by a compiled script.
//!
//! Scripts reach it through `cache_get` / `cache_set`. When full, the oldest
//! insertion is evicted. Expired entries are invisible and purged lazily.

use crate::point::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct Entry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires.map_or(true, |t| t > now)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Keys of `entries`, oldest insertion first
    order: VecDeque<String>,
    stopped: bool,
}

pub struct Cache {
    inner: Mutex<Inner>,
    capacity: usize,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.value.clone())
    }

    /// Insert or refresh an entry. Returns false once the cache is stopped.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        self.set_at(key, value, ttl, Instant::now())
    }

    fn set_at(&self, key: &str, value: Value, ttl: Option<Duration>, now: Instant) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.stopped {
            return false;
        }
        let Inner { entries, order, .. } = &mut *inner;

        if entries.contains_key(key) {
            if let Some(i) = order.iter().position(|k| k == key) {
                order.remove(i);
            }
        } else {
            entries.retain(|_, e| e.live(now));
            order.retain(|k| entries.contains_key(k));
            while entries.len() >= self.capacity {
                let Some(old) = order.pop_front() else { break };
                entries.remove(&old);
            }
        }

        order.push_back(key.to_string());
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires: now.checked_add(ttl.unwrap_or(self.default_ttl)),
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        inner.entries.values().filter(|e| e.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries and reject further writes
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
        inner.stopped = true;
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let cache = Cache::default();
        assert!(cache.set("a", Value::Int(1), None));
        assert_eq!(cache.get("a"), Some(Value::Int(1)));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_expiry() {
        let cache = Cache::default();
        let now = Instant::now();
        cache.set_at("a", Value::Int(1), Some(Duration::from_secs(5)), now);
        assert!(cache.get_at("a", now + Duration::from_secs(4)).is_some());
        assert!(cache.get_at("a", now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_evicts_oldest_insertion() {
        let cache = Cache::new(2, DEFAULT_TTL);
        cache.set("a", Value::Int(1), None);
        cache.set("b", Value::Int(2), None);
        cache.set("a", Value::Int(3), None);
        cache.set("c", Value::Int(4), None);
        // "b" is now the oldest live insertion
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(Value::Int(3)));
        assert_eq!(cache.get("c"), Some(Value::Int(4)));
    }

    #[test]
    fn test_refreshing_a_key_keeps_order_bounded() {
        let cache = Cache::new(10, DEFAULT_TTL);
        for i in 0..10_000 {
            cache.set("same", Value::Int(i), None);
        }
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.entries.len(), 1);
        assert_eq!(inner.order.len(), 1);
    }

    #[test]
    fn test_order_never_exceeds_capacity() {
        let cache = Cache::new(3, DEFAULT_TTL);
        for i in 0..100 {
            cache.set(&format!("k{}", i % 7), Value::Int(i), None);
            let inner = cache.inner.lock().unwrap();
            assert!(inner.order.len() <= 3);
            assert_eq!(inner.order.len(), inner.entries.len());
        }
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let cache = Cache::default();
        let now = Instant::now();
        assert!(cache.set_at("a", Value::Int(1), Some(Duration::from_secs(u64::MAX)), now));
        assert_eq!(
            cache.get_at("a", now + Duration::from_secs(365 * 24 * 3600)),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_stop_rejects_writes() {
        let cache = Cache::default();
        cache.set("a", Value::Int(1), None);
        cache.stop();
        assert!(cache.is_empty());
        assert!(!cache.set("a", Value::Int(1), None));
    }
}

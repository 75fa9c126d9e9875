use std::time::Duration;

use tokio::time::Instant;

/// A cached value plus the bookkeeping used for expiry and eviction.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub size_estimate: u64,
    pub last_access: Instant,
    pub access_count: u64,
    pub inserted_at: Instant,
}

impl<K, V> CacheEntry<K, V> {
    pub fn new(key: K, value: V, size_estimate: u64) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            size_estimate,
            last_access: now,
            access_count: 0,
            inserted_at: now,
        }
    }

    /// Record a lookup and hand back the value.
    pub fn touch(&mut self) -> &V {
        self.last_access = Instant::now();
        self.access_count += 1;
        &self.value
    }

    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    pub fn idle(&self) -> Duration {
        self.last_access.elapsed()
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

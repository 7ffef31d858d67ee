// Short-lived TTL cache
// Keeps ephemeral per-session state (e.g. which provider produced an offer) alive just long
// enough for a follow-up call to reuse it.
//
// Expiry policy: per entry. Every entry expires once `now - inserted_at >= ttl`, where `ttl`
// is the single eviction duration the cache was built with. Eviction is lazy (on access);
// the optional cleanup task only reclaims memory.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub insert_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub insert_count: usize,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // Re-inserting a key restarts its lifetime
    pub fn put(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        self.stats.insert_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let ttl = self.ttl;

        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(ttl, now))
            .is_some()
        {
            self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
            self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired(self.ttl, now))
            .map(|(_, entry)| entry.value)
    }

    // Number of live entries, expired ones are dropped on the way
    pub fn size(&self) -> usize {
        self.evict_expired();
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    // Removes every expired entry, returns how many were dropped
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl, now));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            self.stats
                .expired_count
                .fetch_add(evicted, Ordering::Relaxed);
        }
        evicted
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::Relaxed),
            miss_count: self.stats.miss_count.load(Ordering::Relaxed),
            expired_count: self.stats.expired_count.load(Ordering::Relaxed),
            insert_count: self.stats.insert_count.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // Spawns a periodic sweep on the current tokio runtime.
    // The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = cache.entries.len(), "ttl cache sweep");
                }
            }
        })
    }
}

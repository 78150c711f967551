//! Short-lived caches of the performance optimizer
//!
//! Four independent namespaces, each with its own capacity and TTL, all with
//! least-recently-used eviction.

use crate::config::{CacheConfig, CacheNamespaceConfig, ServerConfig};
use crate::result::CombinedHealthRecord;
use lru::LruCache;
use mcp_health_auth::{CachedCredential, CredentialStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::hash::Hash;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// LRU cache whose entries also expire after a fixed TTL
pub struct TtlLruCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> TtlLruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheNamespaceConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    /// Fresh value for `key`; expired entries are dropped on access
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted_key, _)) = entries.push(key, entry) {
            // replacement also returns the old pair
            if !entries.contains(&evicted_key) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key).map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl CredentialStore for TtlLruCache<String, CachedCredential> {
    fn get(&self, server: &str) -> Option<CachedCredential> {
        TtlLruCache::get(self, &server.to_string())
    }

    fn put(&self, server: &str, credential: CachedCredential) {
        self.insert(server.to_string(), credential);
    }

    fn remove(&self, server: &str) {
        TtlLruCache::remove(self, &server.to_string());
    }
}

/// The four cache namespaces
pub struct CacheManager {
    /// Server-config snapshots by server name
    pub configs: TtlLruCache<String, Arc<ServerConfig>>,
    /// Probe credentials by server name
    pub auth: Arc<TtlLruCache<String, CachedCredential>>,
    /// Resolved addresses by host name
    pub dns: Arc<TtlLruCache<String, Vec<SocketAddr>>>,
    /// Latest combined record by server name
    pub results: TtlLruCache<String, Arc<CombinedHealthRecord>>,
}

/// Statistics of every namespace
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheManagerStats {
    pub configs: CacheStats,
    pub auth: CacheStats,
    pub dns: CacheStats,
    pub results: CacheStats,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            configs: TtlLruCache::from_config(&config.configs),
            auth: Arc::new(TtlLruCache::from_config(&config.auth)),
            dns: Arc::new(TtlLruCache::from_config(&config.dns)),
            results: TtlLruCache::from_config(&config.results),
        }
    }

    /// Forget everything held for a server
    pub fn remove_server(&self, server: &str) {
        let key = server.to_string();
        self.configs.remove(&key);
        self.auth.remove(&key);
        self.results.remove(&key);
    }

    pub fn purge_expired(&self) -> usize {
        self.configs.purge_expired()
            + self.auth.purge_expired()
            + self.dns.purge_expired()
            + self.results.purge_expired()
    }

    pub fn stats(&self) -> CacheManagerStats {
        CacheManagerStats {
            configs: self.configs.stats(),
            auth: self.auth.stats(),
            dns: self.dns.stats(),
            results: self.results.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        cache.insert("c".to_string(), 3);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacement_is_not_eviction() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.insert("a".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(8, Duration::from_secs(5));
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        cache.insert("b".to_string(), 3);
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get(&"b".to_string()), Some(3));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1);
        cache.get(&"a".to_string());
        cache.get(&"missing".to_string());
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }

    #[test]
    fn test_credential_store_namespace() {
        let manager = CacheManager::new(&CacheConfig::default());
        let store: Arc<dyn CredentialStore> = manager.auth.clone();
        store.put("search", CachedCredential::new("t", chrono::Utc::now()));
        assert!(store.get("search").is_some());

        manager.remove_server("search");
        assert!(store.get("search").is_none());
    }
}

//! Credential storage

use crate::credential::CachedCredential;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Keyed storage for cached credentials
///
/// Keys are server names. Implementations must be safe to share across
/// probes; the manager serializes refreshes per server itself.
pub trait CredentialStore: Send + Sync {
    fn get(&self, server: &str) -> Option<CachedCredential>;

    fn put(&self, server: &str, credential: CachedCredential);

    fn remove(&self, server: &str);
}

/// Unbounded in-memory store
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, CachedCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.credentials.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.read().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, server: &str) -> Option<CachedCredential> {
        self.credentials.read().get(server).cloned()
    }

    fn put(&self, server: &str, credential: CachedCredential) {
        self.credentials
            .write()
            .insert(server.to_string(), credential);
    }

    fn remove(&self, server: &str) {
        self.credentials.write().remove(server);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert!(store.is_empty());

        store.put("search", CachedCredential::new("a", Utc::now()));
        store.put("search", CachedCredential::new("b", Utc::now()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("search").unwrap().access_token, "b");

        store.remove("search");
        assert!(store.get("search").is_none());
    }
}

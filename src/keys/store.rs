use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::cache::{CacheLookup, KeyCache};
use super::material::{
    validate_key_id, KeyBlobs, KeyMaterial, GALOIS_BLOB, GALOIS_SINGLE_STEP_BLOB, RELIN_BLOB,
};
use super::remote::RemoteStore;
use crate::error::{Result, StatsError};
use crate::scheme::Evaluator;

/// Two-tier resolver for evaluation keys
///
/// Lookups and cache population for one key id are serialized through a
/// per-key lock, so concurrent first use never races on the cache
/// directory. Different key ids proceed independently. A key's lock lives
/// in the arena only while some caller holds or waits on it.
pub struct KeyStore {
    cache: KeyCache,
    remote: Box<dyn RemoteStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyStore {
    pub fn new(cache_root: impl Into<PathBuf>, remote: Box<dyn RemoteStore>) -> Self {
        Self {
            cache: KeyCache::new(cache_root),
            remote,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Run `f` holding the lock for `key_id`
    fn with_key_lock<T>(&self, key_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StatsError::lock_poisoned("key lock arena"))?;
            locks
                .entry(key_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(StatsError::lock_poisoned("key entry")),
        };

        self.release_lock(key_id, &lock);
        result
    }

    /// Drop the arena entry once only the arena and `lock` refer to it.
    /// Clones are handed out under the arena lock, so the count cannot
    /// grow while it is checked here.
    fn release_lock(&self, key_id: &str, lock: &Arc<Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            if Arc::strong_count(lock) == 2 {
                locks.remove(key_id);
            }
        }
    }

    /// Resolve the evaluation keys for `key_id`
    ///
    /// Cache hit → deserialize. Miss, or cached content that does not
    /// deserialize → fetch the three blobs remotely and repopulate the
    /// cache (best effort). A cache entry that exists but cannot be read
    /// fails with `CacheCorrupt` instead of falling back.
    pub fn resolve<E: Evaluator>(&self, evaluator: &E, key_id: &str) -> Result<KeyMaterial<E>> {
        validate_key_id(key_id)?;
        self.with_key_lock(key_id, || self.resolve_locked(evaluator, key_id))
    }

    fn resolve_locked<E: Evaluator>(&self, evaluator: &E, key_id: &str) -> Result<KeyMaterial<E>> {
        if let CacheLookup::Hit(blobs) = self.cache.read(key_id)? {
            match KeyMaterial::from_blobs(evaluator, key_id, &blobs) {
                Ok(material) => {
                    debug!(key_id, "Key cache hit");
                    return Ok(material);
                }
                Err(e) => {
                    warn!(key_id, error = %e, "Cached keys do not deserialize, re-fetching");
                }
            }
        } else {
            debug!(key_id, "Key cache miss");
        }

        let blobs = self.fetch_remote(key_id)?;
        let material = KeyMaterial::from_blobs(evaluator, key_id, &blobs)?;

        if let Err(e) = self.cache.store(key_id, &blobs) {
            warn!(key_id, error = %e, "Failed to populate key cache");
        }

        Ok(material)
    }

    /// Fetch the three blobs for `key_id` from the remote store
    pub fn fetch_remote(&self, key_id: &str) -> Result<KeyBlobs> {
        validate_key_id(key_id)?;
        info!(key_id, "Fetching keys from remote store");

        let fetch = |name: &str| -> Result<String> {
            self.remote.get_blob(key_id, name)?.ok_or_else(|| {
                StatsError::InvalidKeyMaterial(format!(
                    "key set {} has no {} blob",
                    key_id, name
                ))
            })
        };

        Ok(KeyBlobs {
            galois: fetch(GALOIS_BLOB)?,
            galois_single_step: fetch(GALOIS_SINGLE_STEP_BLOB)?,
            relin: fetch(RELIN_BLOB)?,
        })
    }

    /// Upload the three blobs for a new key set
    pub fn upload(&self, key_id: &str, blobs: &KeyBlobs) -> Result<()> {
        validate_key_id(key_id)?;
        self.remote.put_blob(key_id, GALOIS_BLOB, &blobs.galois)?;
        self.remote
            .put_blob(key_id, GALOIS_SINGLE_STEP_BLOB, &blobs.galois_single_step)?;
        self.remote.put_blob(key_id, RELIN_BLOB, &blobs.relin)?;
        info!(key_id, "Uploaded key set");
        Ok(())
    }

    /// Drop the local cache entry only; idempotent
    pub fn invalidate(&self, key_id: &str) -> Result<()> {
        validate_key_id(key_id)?;
        self.with_key_lock(key_id, || self.cache.remove(key_id))
    }

    /// Revoke a key set: local cache entry, then the remote container
    ///
    /// Idempotent; deleting an unknown key id succeeds.
    pub fn delete(&self, key_id: &str) -> Result<()> {
        validate_key_id(key_id)?;
        self.with_key_lock(key_id, || {
            self.cache.remove(key_id)?;
            self.remote.delete_container(key_id)?;
            info!(key_id, "Deleted key set");
            Ok(())
        })
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("cache_root", &self.cache.root())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key_blobs;
    use crate::keys::remote::MemoryStore;
    use crate::params::SchemeParams;
    use crate::scheme::sim::SimScheme;
    use crate::scheme::ClientScheme;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, SimScheme, MemoryStore, KeyStore) {
        let dir = tempdir().unwrap();
        let scheme = SimScheme::with_seed(SchemeParams::slots_256(), 2);
        let remote = MemoryStore::new();
        let store = KeyStore::new(dir.path(), Box::new(remote.clone()));
        (dir, scheme, remote, store)
    }

    #[test]
    fn test_second_resolve_hits_cache() {
        let (_dir, scheme, remote, store) = setup();
        let (sk, _) = scheme.keygen().unwrap();
        store.upload("k1", &generate_key_blobs(&scheme, &sk).unwrap()).unwrap();

        store.resolve(&scheme, "k1").unwrap();
        assert_eq!(remote.fetch_count(), 3);
        store.resolve(&scheme, "k1").unwrap();
        assert_eq!(remote.fetch_count(), 3);
    }

    #[test]
    fn test_unknown_key_id() {
        let (_dir, scheme, _remote, store) = setup();
        let err = store.resolve(&scheme, "nobody").unwrap_err();
        assert!(matches!(err, StatsError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_remote_outage_surfaces_retryable() {
        let (_dir, scheme, remote, store) = setup();
        remote.set_offline(true);
        let err = store.resolve(&scheme, "k1").unwrap_err();
        assert!(err.is_retryable());
    }

    fn arena_len(store: &KeyStore) -> usize {
        store.locks.lock().unwrap().len()
    }

    #[test]
    fn test_lock_arena_does_not_grow() {
        let (_dir, scheme, _remote, store) = setup();
        for i in 0..5000 {
            let key_id = format!("stranger-{}", i);
            assert!(store.resolve(&scheme, &key_id).is_err());
            store.delete(&key_id).unwrap();
            store.invalidate(&key_id).unwrap();
        }
        assert_eq!(arena_len(&store), 0);

        let (sk, _) = scheme.keygen().unwrap();
        store.upload("k1", &generate_key_blobs(&scheme, &sk).unwrap()).unwrap();
        store.resolve(&scheme, "k1").unwrap();
        store.resolve(&scheme, "k1").unwrap();
        assert_eq!(arena_len(&store), 0);
    }

    #[test]
    fn test_lock_kept_while_another_caller_waits() {
        let (_dir, _scheme, _remote, store) = setup();
        let waiter = store
            .locks
            .lock()
            .unwrap()
            .entry("k1".to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        store.invalidate("k1").unwrap();
        assert_eq!(arena_len(&store), 1);

        store.release_lock("k1", &waiter);
        assert_eq!(arena_len(&store), 0);
    }

    #[test]
    fn test_invalid_key_id_rejected_before_io() {
        let (_dir, scheme, remote, store) = setup();
        assert!(store.resolve(&scheme, "../k1").is_err());
        assert!(store.delete("").is_err());
        assert_eq!(remote.fetch_count(), 0);
    }
}

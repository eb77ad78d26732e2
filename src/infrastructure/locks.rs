use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock registry handing out one async mutex per key.
///
/// Writers for the same key (a transaction id, a user id) queue behind one
/// mutex; writers for different keys never wait on each other. The registry
/// only holds weak references, and the last guard released for a key
/// removes its entry.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: Arc<DashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

/// Exclusive access to one key. Dropping it releases the key.
pub struct KeyGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: Arc<DashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold strong refs, so a dead entry has none left.
        self.locks
            .remove_if(&self.key, |_, weak| weak.strong_count() == 0);
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<K> {
        let mutex = match self.locks.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(mutex) => mutex,
                None => {
                    let mutex = Arc::new(AsyncMutex::new(()));
                    entry.insert(Arc::downgrade(&mutex));
                    mutex
                }
            },
            Entry::Vacant(entry) => {
                let mutex = Arc::new(AsyncMutex::new(()));
                entry.insert(Arc::downgrade(&mutex));
                mutex
            }
        };

        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    #[cfg(test)]
    fn registered_keys(&self) -> usize {
        self.locks.len()
    }
}

//! At-most-once model cache
//!
//! Loading a classifier is expensive and its weights never change during a
//! session, so loaded models are shared behind an [`Arc`]. Each key gets its
//! own slot lock: concurrent first requests for the same path wait for a
//! single load, while different paths load independently. Failed or panicking
//! loads store nothing, so a later request retries.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::utils::error::{CarXplainError, Result};

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Cache keyed by model file path
pub struct ModelCache<T, K = PathBuf> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<T, K: Eq + Hash + Clone> Default for ModelCache<T, K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<'a, V>(mutex: &'a Mutex<V>) -> Result<MutexGuard<'a, V>> {
    mutex
        .lock()
        .map_err(|_| CarXplainError::Inference("model cache lock poisoned".to_string()))
}

/// Slot guard; a loader that panicked never stored a value, so the slot is still usable
fn lock_slot<V>(slot: &Mutex<V>) -> MutexGuard<'_, V> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, K: Eq + Hash + Clone> ModelCache<T, K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, running `load` if it is absent.
    ///
    /// `load` runs at most once per key across threads unless it fails.
    pub fn get_or_load<F>(&self, key: &K, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let slot = {
            let mut slots = lock(&self.slots)?;
            slots.entry(key.clone()).or_default().clone()
        };

        let mut entry = lock_slot::<Option<Arc<T>>>(&slot);
        if let Some(value) = entry.as_ref() {
            return Ok(Arc::clone(value));
        }

        match load() {
            Ok(value) => {
                let value = Arc::new(value);
                *entry = Some(Arc::clone(&value));
                Ok(value)
            }
            Err(e) => {
                drop(entry);
                self.forget_empty(key, &slot);
                Err(e)
            }
        }
    }

    /// Remove `key`'s slot after a failed load unless another caller is waiting on it
    fn forget_empty(&self, key: &K, slot: &Slot<T>) {
        if let Ok(mut slots) = lock(&self.slots) {
            // held by the map and by this caller only
            let unused = slots
                .get(key)
                .map_or(false, |current| Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2);
            if unused {
                slots.remove(key);
            }
        }
    }

    /// Number of slots, loaded or not
    #[cfg(test)]
    fn slot_count(&self) -> usize {
        lock(&self.slots).map(|slots| slots.len()).unwrap_or(0)
    }

    /// Cached value without loading
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        let slot = lock(&self.slots).ok()?.get(key).cloned()?;
        let entry = lock_slot::<Option<Arc<T>>>(&slot);
        entry.clone()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of successfully loaded entries
    pub fn len(&self) -> usize {
        let slots = match lock(&self.slots) {
            Ok(slots) => slots.values().cloned().collect::<Vec<_>>(),
            Err(_) => return 0,
        };
        slots
            .iter()
            .filter(|slot| lock_slot::<Option<Arc<T>>>(slot).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        if let Ok(mut slots) = lock(&self.slots) {
            slots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_loads_once_per_key() {
        let cache: ModelCache<String> = ModelCache::new();
        let key = PathBuf::from("a.mpk");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load(&key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("model".to_string())
                })
                .unwrap();
            assert_eq!(*value, "model");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_first_load_runs_once() {
        let cache: Arc<ModelCache<usize>> = Arc::new(ModelCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = PathBuf::from("shared.mpk");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let key = key.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_load(&key, || {
                            std::thread::sleep(Duration::from_millis(20));
                            Ok(calls.fetch_add(1, Ordering::SeqCst))
                        })
                        .unwrap()
                })
            })
            .collect();

        let values: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }

    #[test]
    fn test_failed_load_is_retried() {
        let cache: ModelCache<u8> = ModelCache::new();
        let key = PathBuf::from("broken.mpk");

        let first = cache.get_or_load(&key, || {
            Err(CarXplainError::ModelLoadFailure {
                path: key.clone(),
                reason: "corrupt".to_string(),
            })
        });
        assert!(first.is_err());
        assert!(!cache.contains(&key));

        assert_eq!(cache.slot_count(), 0);

        let second = cache.get_or_load(&key, || Ok(7)).unwrap();
        assert_eq!(*second, 7);
    }

    #[test]
    fn test_panicking_load_does_not_block_key() {
        let cache: Arc<ModelCache<u8>> = Arc::new(ModelCache::new());
        let key = PathBuf::from("panics.mpk");

        let panicked = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            std::thread::spawn(move || {
                let _ = cache.get_or_load(&key, || -> Result<u8> { panic!("decoder crashed") });
            })
            .join()
        };
        assert!(panicked.is_err());
        assert!(!cache.contains(&key));

        let value = cache.get_or_load(&key, || Ok(3)).unwrap();
        assert_eq!(*value, 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let cache: ModelCache<&'static str> = ModelCache::new();
        cache.get_or_load(&PathBuf::from("a"), || Ok("a")).unwrap();
        cache.get_or_load(&PathBuf::from("b"), || Ok("b")).unwrap();
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! Per-key mutual exclusion.
//!
//! Each key gets its own mutex on demand. The map entry is dropped again once
//! the last holder or waiter releases it, so idle keys cost nothing.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RawMutex};
use parking_lot::lock_api::ArcMutexGuard;

type Slot = Arc<Mutex<()>>;

/// Lock table keyed by `K`.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free and hold it until the guard drops.
    pub fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_arc();
        KeyGuard {
            owner: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Held key lock.
pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let slot = Arc::clone(ArcMutexGuard::mutex(&guard));
        drop(guard);

        let mut slots = self.owner.slots.lock();
        // One reference in the map and one in `slot`: nobody else waits.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&self.key);
        }
    }
}

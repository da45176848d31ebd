//! Per-key async mutual exclusion.
//!
//! Work on different keys runs concurrently; work on the same key is
//! serialized for as long as the returned guard lives.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct KeyedLock {
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub struct KeyGuard {
    key: String,
    slots: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        KeyGuard {
            key: key.to_string(),
            slots: self.slots.clone(),
            guard: Some(slot.lock_owned().await),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the strong count below reflects only waiters.
        drop(self.guard.take());

        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = slots
            .get(&self.key)
            .map(|slot| Arc::strong_count(slot) == 1)
            .unwrap_or(false);
        if idle {
            slots.remove(&self.key);
        }
    }
}

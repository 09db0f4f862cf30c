//! Reference-counted registry of shared database states.
//!
//! One [`InstancePool`] is created by whoever builds handler instances and is
//! passed to them explicitly. Each key maps to `(refs, value)`; the value is
//! built at most once per key at a time and shut down when the last reference
//! is released.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

/// A pooled value that owns background resources.
pub trait PoolMember: Send + Sync {
    /// Stops background work and releases resources. Called once, when the
    /// last reference is released.
    fn shutdown(&self);
}

struct PoolEntry<T> {
    refs: usize,
    cell: Arc<OnceCell<Arc<T>>>,
}

/// Keyed registry of shared, reference-counted values.
pub struct InstancePool<T: PoolMember> {
    entries: Mutex<HashMap<String, PoolEntry<T>>>,
}

impl<T: PoolMember> Default for InstancePool<T> {
    fn default() -> Self {
        InstancePool {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: PoolMember> InstancePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `key`, building it with `factory` if absent.
    ///
    /// Concurrent acquirers of one key wait for a single factory run and share
    /// its result; other keys are not blocked meanwhile. A failed (or
    /// cancelled) acquisition holds no reference afterwards.
    pub async fn acquire_or_create<F, Fut, E>(&self, key: &str, factory: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let cell = {
            let mut entries = self.lock();
            let entry = entries.entry(key.to_string()).or_insert_with(|| PoolEntry {
                refs: 0,
                cell: Arc::new(OnceCell::new()),
            });
            entry.refs += 1;
            Arc::clone(&entry.cell)
        };

        let mut reservation = Reservation {
            pool: self,
            key,
            cell: Arc::clone(&cell),
            armed: true,
        };

        let value = Arc::clone(cell.get_or_try_init(factory).await?);
        reservation.armed = false;
        Ok(value)
    }

    /// Drops one reference to `key`; the last release shuts the value down.
    ///
    /// Returns `true` when this call shut the value down.
    pub fn release(&self, key: &str) -> bool {
        let removed = {
            let mut entries = self.lock();
            match entries.get_mut(key) {
                Some(entry) if entry.refs > 1 => {
                    entry.refs -= 1;
                    None
                }
                Some(_) => entries.remove(key),
                None => {
                    log::warn!("Release of unknown pool key {}", key);
                    None
                }
            }
        };

        // Outside the lock: shutdown may log and take other locks
        match removed.and_then(|entry| entry.cell.get().cloned()) {
            Some(value) => {
                value.shutdown();
                true
            }
            None => false,
        }
    }

    /// Current reference count of `key` (0 when absent).
    pub fn ref_count(&self, key: &str) -> usize {
        self.lock().get(key).map(|e| e.refs).unwrap_or(0)
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Undoes the reference taken by an acquisition that did not complete.
    fn unreserve(&self, key: &str, cell: &Arc<OnceCell<Arc<T>>>) {
        let removed = {
            let mut entries = self.lock();
            match entries.get_mut(key) {
                Some(entry) if Arc::ptr_eq(&entry.cell, cell) => {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        entries.remove(key)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        // Only reachable if every successful holder released while this
        // acquirer was still waiting
        if let Some(value) = removed.and_then(|entry| entry.cell.get().cloned()) {
            value.shutdown();
        }
    }
}

struct Reservation<'a, T: PoolMember> {
    pool: &'a InstancePool<T>,
    key: &'a str,
    cell: Arc<OnceCell<Arc<T>>>,
    armed: bool,
}

impl<T: PoolMember> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.unreserve(self.key, &self.cell);
        }
    }
}

//! Named mutual exclusion.
//!
//! A relationship operation holds the key of its profile pair for the whole
//! read-modify-write sequence; a group operation holds the key of its group.
//! Operations on unrelated keys never wait for each other.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its key when dropped.
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until `key` is free, then take it.
    pub fn lock(&self, key: impl Into<String>) -> KeyGuard<'_> {
        let key = key.into();
        let mut held = self.held();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|e| e.into_inner());
        }
        held.insert(key.clone());
        KeyGuard { locks: self, key }
    }

    #[cfg(test)]
    fn is_held(&self, key: &str) -> bool {
        self.held().contains(key)
    }
}

#[cfg(test)]
impl KeyGuard<'_> {
    fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.key);
        self.locks.released.notify_all();
    }
}

/// Lock key for the relationship between two profiles; argument order does
/// not matter.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("pair:{a}:{b}")
    } else {
        format!("pair:{b}:{a}")
    }
}

pub fn group_key(group_id: &str) -> String {
    format!("group:{group_id}")
}

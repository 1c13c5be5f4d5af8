//! Process-wide profile cache.
//!
//! Lookups by id are served from here when possible. Every code path that
//! writes a profile, one of its edges, or one of its chat memberships must
//! call [`ProfileCache::invalidate`] for that profile after the write,
//! whether or not the write succeeded.
//!
//! A reader that misses the cache takes a [`ProfileCache::generation`]
//! ticket before going to the store and hands it back to
//! [`ProfileCache::insert_if_current`]. An invalidation in between bumps the
//! generation and the loaded copy is dropped instead of cached.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::Profile;

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Profile>,
    // One counter per profile ever invalidated; never reset, so a ticket
    // taken before a full-cache clear still compares correctly.
    generations: HashMap<String, u64>,
}

pub struct ProfileCache {
    slots: Mutex<Slots>,
    capacity: usize,
}

impl ProfileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            capacity,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<Profile> {
        self.slots().entries.get(id).cloned()
    }

    /// Ticket for a later [`ProfileCache::insert_if_current`].
    pub fn generation(&self, id: &str) -> u64 {
        self.slots().generations.get(id).copied().unwrap_or(0)
    }

    /// Cache `profile` unless it was invalidated after `generation` was
    /// taken. Returns whether the profile was cached.
    pub fn insert_if_current(&self, profile: Profile, generation: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut slots = self.slots();
        if slots.generations.get(&profile.id).copied().unwrap_or(0) != generation {
            return false;
        }
        // No eviction order is tracked; a full cache simply starts over.
        if slots.entries.len() >= self.capacity && !slots.entries.contains_key(&profile.id) {
            slots.entries.clear();
        }
        slots.entries.insert(profile.id.clone(), profile);
        true
    }

    pub fn invalidate(&self, id: &str) {
        self.invalidate_all([id]);
    }

    pub fn invalidate_all<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut slots = self.slots();
        for id in ids {
            slots.entries.remove(id);
            *slots.generations.entry(id.to_string()).or_insert(0) += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.slots().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProfileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

//! Wiring of the relationship graph, the group manager and their shared
//! collaborators.

use std::sync::Arc;

use crate::cache::{ProfileCache, DEFAULT_CACHE_CAPACITY};
use crate::chat::ChatProvisioner;
use crate::friendship::FriendshipStateMachine;
use crate::groups::GroupMembershipManager;
use crate::locks::KeyedLocks;
use crate::notify::NotificationDispatcher;
use crate::profiles::ProfileDirectory;
use crate::store::ProfileStore;

/// Extra attempts made for the second write of an edge pair.
pub const DEFAULT_WRITE_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub write_retries: u32,
    pub cache_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            write_retries: DEFAULT_WRITE_RETRIES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// The service facade. Friendship and group operations share one lock
/// table, one profile cache and one chat provisioner.
pub struct Rapport {
    pub profiles: Arc<ProfileDirectory>,
    pub friendships: FriendshipStateMachine,
    pub groups: GroupMembershipManager,
}

impl Rapport {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        options: Options,
    ) -> Self {
        let profiles = Arc::new(ProfileDirectory::new(
            store.clone(),
            ProfileCache::new(options.cache_capacity),
        ));
        let locks = Arc::new(KeyedLocks::new());
        let chats = Arc::new(ChatProvisioner::new(store.clone()));

        let friendships = FriendshipStateMachine::new(
            store.clone(),
            profiles.clone(),
            locks.clone(),
            chats.clone(),
            notifier.clone(),
            options.write_retries,
        );
        let groups = GroupMembershipManager::new(store, profiles.clone(), locks, chats, notifier);

        Self {
            profiles,
            friendships,
            groups,
        }
    }
}

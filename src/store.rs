//! Persistence seam used by the relationship graph and the group manager.
//!
//! Implementations only have to make each individual call atomic. Keeping
//! the two mirrored edges of a relationship in agreement is the caller's
//! job (see [`crate::friendship`]).

use crate::model::{Chat, ChatMessage, Edge, Group, Profile, RelationshipStatus};
use crate::storage::StorageError;

pub trait ProfileStore: Send + Sync {
    /// Load a profile with its edges and chat memberships.
    fn find_profile(&self, id: &str) -> Result<Option<Profile>, StorageError>;
    fn find_profile_by_user(&self, user_id: &str) -> Result<Option<Profile>, StorageError>;
    fn find_profile_by_phone(&self, phone: &str) -> Result<Option<Profile>, StorageError>;

    /// Insert a new profile. Fails with `AlreadyExists` on a duplicate id,
    /// user id or phone.
    fn insert_profile(&self, profile: &Profile) -> Result<(), StorageError>;
    /// Update a profile's own fields. Edges and chats are left untouched.
    fn save_profile(&self, profile: &Profile) -> Result<(), StorageError>;
    /// Update several profiles as one unit.
    fn save_profiles(&self, profiles: &[Profile]) -> Result<(), StorageError>;

    fn get_edge(&self, owner_id: &str, target_id: &str) -> Result<Option<Edge>, StorageError>;
    /// Insert or replace a single edge.
    fn put_edge(&self, edge: &Edge) -> Result<(), StorageError>;
    fn delete_edge(&self, owner_id: &str, target_id: &str) -> Result<bool, StorageError>;
    fn list_edges(
        &self,
        owner_id: &str,
        status: Option<RelationshipStatus>,
    ) -> Result<Vec<Edge>, StorageError>;

    /// Create a chat, its member links and its first message.
    fn insert_chat(&self, chat: &Chat, first_message: &ChatMessage) -> Result<(), StorageError>;
    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StorageError>;
    fn delete_chat(&self, chat_id: &str) -> Result<bool, StorageError>;
    fn add_chat_member(
        &self,
        chat_id: &str,
        profile_id: &str,
        join_time: u64,
    ) -> Result<(), StorageError>;
    fn remove_chat_member(&self, chat_id: &str, profile_id: &str) -> Result<bool, StorageError>;

    /// Create a group with its members.
    fn insert_group(&self, group: &Group) -> Result<(), StorageError>;
    fn get_group(&self, group_id: &str) -> Result<Option<Group>, StorageError>;
    /// Replace a group's fields and member list.
    fn save_group(&self, group: &Group) -> Result<(), StorageError>;
    fn delete_group(&self, group_id: &str) -> Result<bool, StorageError>;
    fn list_groups_for(&self, profile_id: &str) -> Result<Vec<Group>, StorageError>;
}
